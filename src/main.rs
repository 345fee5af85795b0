//! TopParams CLI - inspect and simulate the parameter relay.
//!
//! See the `top_params` library for the protocol itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use top_params::sim::Browser;
use top_params::{ListenerConfig, ParameterSet, ReaderConfig, ReaderOutputs};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TOP_PARAMS_LOG";

#[derive(Parser)]
#[command(name = "top-params")]
#[command(version)]
#[command(about = "Relay a host page's URL parameters into embedded frames")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a Reader under a host page and print its outputs
    Simulate {
        /// URL of the host page
        #[arg(long, default_value = "https://site.example.com/?a=1&b=2")]
        url: String,
        /// Origin of the embedded frames
        #[arg(long, default_value = "https://apps.example.com")]
        frame_origin: String,
        /// Frame levels between the host page and the Reader
        #[arg(long, default_value_t = 1)]
        nesting: usize,
        /// Parameter exposed as `parameterValue`
        #[arg(long, default_value = "a")]
        parameter: String,
        /// Do not run a Listener in the host page
        #[arg(long)]
        no_listener: bool,
        /// Run the drop-in page script instead of the extension
        #[arg(long)]
        snippet: bool,
        /// Reader configuration (JSON)
        #[arg(long)]
        reader_config: Option<PathBuf>,
        /// Listener configuration (JSON); overrides --snippet
        #[arg(long)]
        listener_config: Option<PathBuf>,
        /// Virtual milliseconds to run
        #[arg(long, default_value_t = 6000)]
        duration_ms: u64,
    },
    /// Print the parameters of a URL or query string
    Parse {
        /// Absolute URL, or a query string such as `?a=1&b=2`
        input: String,
    },
    /// Print the default configurations
    Defaults,
}

/// Printed by `simulate`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    outputs: ReaderOutputs,
    status: String,
    notifications: usize,
    broadcasts: usize,
    messages_delivered: usize,
    messages_dropped: usize,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, "info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Simulate {
            url,
            frame_origin,
            nesting,
            parameter,
            no_listener,
            snippet,
            reader_config,
            listener_config,
            duration_ms,
        } => {
            let reader_config = match reader_config {
                Some(path) => ReaderConfig::from_json(&read_config(&path)?)?,
                None => ReaderConfig::default(),
            };
            let listener_config = match listener_config {
                Some(path) => Some(ListenerConfig::from_json(&read_config(&path)?)?),
                None if no_listener => None,
                None if snippet => Some(ListenerConfig::snippet()),
                None => Some(ListenerConfig::default()),
            };

            let report = simulate(
                &url,
                &frame_origin,
                nesting,
                &parameter,
                reader_config,
                listener_config,
                Duration::from_millis(duration_ms),
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Parse { input } => {
            let params = if input.contains("://") {
                ParameterSet::from_url(&input).with_context(|| format!("Invalid URL: {input}"))?
            } else {
                ParameterSet::from_search(&input)
            };
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
        Commands::Defaults => {
            let defaults = serde_json::json!({
                "reader": ReaderConfig::default(),
                "listener": ListenerConfig::default(),
                "snippet": ListenerConfig::snippet(),
            });
            println!("{}", serde_json::to_string_pretty(&defaults)?);
        }
    }

    Ok(())
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn simulate(
    url: &str,
    frame_origin: &str,
    nesting: usize,
    parameter: &str,
    reader_config: ReaderConfig,
    listener_config: Option<ListenerConfig>,
    duration: Duration,
) -> Result<SimulationReport> {
    let mut browser = Browser::from_url(url).with_context(|| format!("Invalid URL: {url}"))?;
    let top = browser.top();

    if let Some(config) = listener_config {
        browser.install_listener(top, config)?;
    }

    let mut frame = top;
    for _ in 0..nesting.max(1) {
        frame = browser.add_frame(frame, frame_origin, "");
    }
    browser.install_reader(frame, reader_config, parameter);
    browser.advance(duration);

    let reader = browser
        .reader(frame)
        .context("Reader is not running in the simulated frame")?;
    Ok(SimulationReport {
        outputs: reader.outputs(),
        status: reader.view().compact_label(),
        notifications: browser.notifications(frame),
        broadcasts: browser.broadcasts().len(),
        messages_delivered: browser.messages_delivered(),
        messages_dropped: browser.messages_dropped(),
        elapsed_ms: browser.now().as_millis(),
    })
}
