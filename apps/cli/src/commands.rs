//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use paperboy_core::pipeline::{ProgressReporter, RunConfig, RunResult};
use paperboy_crawler::build_client;
use paperboy_shared::{
    AppConfig, FetchConfig, config_file_path, init_config_at, load_config_or_default,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Paperboy: today's newspaper as an e-book.
#[derive(Parser)]
#[command(
    name = "paperboy",
    version,
    about = "Fetch the day's front-page articles and bundle them into an EPUB.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.paperboy/paperboy.toml).
    #[arg(long, global = true, env = "PAPERBOY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch today's articles and write the EPUB.
    Run {
        /// Output directory for the EPUB (overrides `output.dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum concurrent article fetches.
        #[arg(short, long)]
        concurrency: Option<u32>,

        /// Minimum spacing between request starts, in milliseconds.
        #[arg(long)]
        rate_limit_ms: Option<u64>,

        /// Skip the cover image.
        #[arg(long)]
        no_cover: bool,
    },

    /// Print the discovered article links as JSON.
    Links,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "paperboy=info",
        1 => "paperboy=debug",
        _ => "paperboy=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };

    match cli.command {
        Command::Run {
            out,
            concurrency,
            rate_limit_ms,
            no_cover,
        } => {
            let app = load_config_or_default(&config_path)?;
            let overrides = RunOverrides {
                out,
                concurrency,
                rate_limit_ms,
                no_cover,
            };
            cmd_run(overrides.apply(app)).await
        }
        Command::Links => cmd_links(&config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&config_path),
            ConfigAction::Show => cmd_config_show(&config_path),
        },
    }
}

/// `run` flags that override config file values.
#[derive(Debug, Default)]
struct RunOverrides {
    out: Option<PathBuf>,
    concurrency: Option<u32>,
    rate_limit_ms: Option<u64>,
    no_cover: bool,
}

impl RunOverrides {
    fn apply(self, mut app: AppConfig) -> RunConfig {
        if let Some(out) = &self.out {
            app.output.dir = out.to_string_lossy().into_owned();
        }
        if let Some(concurrency) = self.concurrency {
            app.fetch.concurrency = concurrency;
        }
        if let Some(ms) = self.rate_limit_ms {
            app.fetch.rate_limit_ms = ms;
        }

        let mut config = RunConfig::from_app(app);
        config.fetch_cover = !self.no_cover;
        config
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: RunConfig) -> Result<()> {
    info!(
        source = %config.app.source.front_page_url,
        out = %config.output_dir.display(),
        concurrency = config.fetch.concurrency,
        "starting paperboy run"
    );

    let reporter = CliProgress::new();
    let result = match paperboy_core::pipeline::run(&config, &reporter).await {
        Ok(result) => result,
        Err(e) => {
            reporter.abandon();
            return Err(e).wrap_err("run failed");
        }
    };

    println!();
    println!("  EPUB written: {}", result.output_path.display());
    println!("  Sections: {}", result.artifact.sections.len());
    println!("  Articles: {}", result.artifact.article_count());
    println!("  Images:   {}", result.artifact.images.len());
    println!(
        "  Cover:    {}",
        if result.artifact.cover.is_some() { "yes" } else { "no" }
    );
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());

    if !result.failures.is_empty() {
        println!();
        println!("  {} article(s) could not be fetched:", result.failures.len());
        for failure in &result.failures {
            println!("    [{}] {} ({})", failure.group, failure.url, failure.cause);
        }
    }
    println!();

    Ok(())
}

async fn cmd_links(config_path: &Path) -> Result<()> {
    let app = load_config_or_default(config_path)?;
    let client = build_client(&FetchConfig::from(&app))?;
    let links = paperboy_discovery::discover(&app.source, &client).await?;

    let json = serde_json::to_string_pretty(&links)?;
    println!("{json}");
    Ok(())
}

fn cmd_config_init(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(eyre!("config file already exists at {}", path.display()));
    }
    init_config_at(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: &Path) -> Result<()> {
    let config = load_config_or_default(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", path.display());
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    /// Stop the spinner when the run fails before `done`.
    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn article_fetched(&self, url: &str, fetched: bool, current: usize, total: usize) {
        let mark = if fetched { "" } else { " (failed)" };
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {url}{mark}"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "paperboy",
            "-vv",
            "run",
            "--out",
            "/tmp/books",
            "--concurrency",
            "8",
            "--rate-limit-ms",
            "0",
            "--no-cover",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run {
                out,
                concurrency,
                rate_limit_ms,
                no_cover,
            } => {
                assert_eq!(out.as_deref(), Some(Path::new("/tmp/books")));
                assert_eq!(concurrency, Some(8));
                assert_eq!(rate_limit_ms, Some(0));
                assert!(no_cover);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["paperboy", "config", "show", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("x.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn overrides_beat_config_file() {
        let overrides = RunOverrides {
            out: Some(PathBuf::from("/tmp/out")),
            concurrency: Some(2),
            rate_limit_ms: Some(250),
            no_cover: true,
        };
        let config = overrides.apply(AppConfig::default());

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.image_dir, PathBuf::from("/tmp/out/img"));
        assert_eq!(config.fetch.concurrency, 2);
        assert_eq!(config.fetch.rate_limit, Duration::from_millis(250));
        assert!(!config.fetch_cover);
    }

    #[test]
    fn no_overrides_keep_defaults() {
        let config = RunOverrides::default().apply(AppConfig::default());
        assert_eq!(config.fetch.concurrency, 4);
        assert!(config.fetch_cover);
    }

    #[test]
    fn abandoned_spinner_stops_ticking() {
        let reporter = CliProgress::new();
        reporter.phase("Fetching articles");
        reporter.abandon();
        assert!(reporter.spinner.is_finished());
    }
}
