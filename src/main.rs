//! CLI entry point for `mailtmpl`.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mailtmpl::config::{self, Config};
use mailtmpl::parser::message;
use mailtmpl::render;

/// Render an email read from stdin through a text template.
///
/// Meant to sit behind a mail delivery hook: the message arrives on stdin and
/// the rendered text is written to stdout.
#[derive(Parser)]
#[command(name = "mailtmpl", version)]
struct Cli {
    /// Read the template from a file instead of the command line
    #[arg(short = 'f', long, value_name = "FILE")]
    template_file: Option<PathBuf>,

    /// Extract multipart parts whose Content-Type starts with PREFIX
    #[arg(short = 't', long, value_name = "PREFIX")]
    content_type: Option<String>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Template source; all arguments are joined without separators
    #[arg(
        value_name = "TEMPLATE",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        conflicts_with = "template_file"
    )]
    template: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref());

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let source = template_source(&cli, &config)?;
    let prefix = cli
        .content_type
        .as_deref()
        .unwrap_or(&config.extract.content_type);

    let raw = message::read_input(io::stdin().lock(), "<stdin>")?;
    let output = render::render_message(&raw, prefix, &source)?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&output)
        .and_then(|()| stdout.flush())
        .context("failed to write output")?;
    Ok(())
}

/// The template from `--template-file`, the arguments, or the configured default.
fn template_source(cli: &Cli, config: &Config) -> anyhow::Result<String> {
    if let Some(path) = &cli.template_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read template file {}", path.display()));
    }
    if !cli.template.is_empty() {
        return Ok(cli.template.concat());
    }
    Ok(config.template.default.clone().unwrap_or_default())
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_target = config.general.log_file.as_deref().and_then(|path| {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
        let dir = dir.unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name()?;
        std::fs::create_dir_all(dir).ok()?;
        Some((dir.to_path_buf(), name.to_os_string()))
    });

    if let Some((dir, name)) = log_target {
        let file_appender = tracing_appender::rolling::never(dir, name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}
