//! CLI command definitions, routing, and tracing setup.

use std::path::Path;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use convoreplay_core::{LoadedConversation, ReplaySession, parse_content};
use convoreplay_formats::analyze;
use convoreplay_shared::{
    AppConfig, ContextItem, ConversationData, SourceOptions, init_config, load_config,
    sort_context_items, validate_context_item,
};
use convoreplay_sources::SourceRegistry;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Longest message preview printed in text mode.
const PREVIEW_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// convoreplay: normalize recorded agent conversations and their context files.
#[derive(Parser)]
#[command(
    name = "convoreplay",
    version,
    about = "Load conversation logs from files, gists and repositories into one message format.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Load a conversation from a file path, URL, gist or repository tree.
    Load {
        /// Locator: local path, http(s) URL, gist URL or GitHub tree URL.
        locator: String,

        /// Print the parsed conversation and context as JSON.
        #[arg(long)]
        json: bool,

        /// Wait for textual context files to be prefetched.
        #[arg(long)]
        prefetch: bool,
    },

    /// Parse a local file without any context discovery.
    Parse {
        /// Path to the conversation file.
        path: String,

        /// Print the parsed conversation as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the context files a locator declares.
    Context {
        /// Locator: local path, http(s) URL, gist URL or GitHub tree URL.
        locator: String,
    },

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
        0 => "convoreplay=info",
        1 => "convoreplay=debug",
        _ => "convoreplay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Load {
            locator,
            json,
            prefetch,
        } => cmd_load(&locator, json, prefetch).await,
        Command::Parse { path, json } => cmd_parse(&path, json).await,
        Command::Context { locator } => cmd_context(&locator).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_load(locator: &str, json: bool, prefetch: bool) -> Result<()> {
    let config = load_config()?;
    let session = ReplaySession::new(&config)?;

    info!(locator, "loading conversation");
    let loaded = session.load(locator).await?;

    if prefetch && !loaded.context.is_empty() {
        wait_for_prefetch(&session).await?;
    }

    if json {
        let mut out = serde_json::to_value(&loaded)?;
        if prefetch {
            out["prefetch"] = serde_json::to_value(session.prefetcher().records())?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_loaded(&loaded);
    if prefetch {
        let status = session.prefetcher().status();
        println!(
            "  Prefetch: {} loaded, {} failed, {} total",
            status.loaded, status.error, status.total
        );
        println!();
    }

    Ok(())
}

async fn cmd_parse(path: &str, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(Path::new(path))
        .map_err(|e| eyre!("cannot read '{path}': {e}"))?;

    let data = parse_content(&content);

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    print_conversation(&data);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
        let analysis = analyze(&value);
        println!("  Vendor:  {:?}", analysis.vendor);
        if let Some(version) = &analysis.version {
            println!("  Version: {version}");
        }
        println!(
            "  History: {} entries (first: {:?})",
            analysis.history_len, analysis.first_entry_shape
        );
        println!();
    }

    Ok(())
}

async fn cmd_context(locator: &str) -> Result<()> {
    let config = load_config()?;
    let registry = SourceRegistry::new(&SourceOptions::from(&config))?;
    let adapter = registry.select(locator);

    info!(locator, adapter = adapter.name(), "discovering context");
    let mut items: Vec<ContextItem> = adapter
        .discover_context(locator)
        .await
        .into_iter()
        .filter(validate_context_item)
        .collect();
    sort_context_items(&mut items);

    if items.is_empty() {
        println!("No context files found.");
        return Ok(());
    }

    print_context(&items);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

async fn wait_for_prefetch(session: &ReplaySession) -> Result<()> {
    let prefetcher = session.prefetcher();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));

    let idle = prefetcher.wait_until_idle();
    tokio::pin!(idle);
    let mut tick = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            () = &mut idle => break,
            _ = tick.tick() => {
                let status = prefetcher.status();
                spinner.set_message(format!(
                    "Prefetching [{}/{}]",
                    status.loaded + status.error,
                    status.total
                ));
            }
        }
    }

    spinner.finish_and_clear();
    Ok(())
}

fn print_loaded(loaded: &LoadedConversation) {
    print_conversation(&loaded.data);
    println!("  Adapter: {}", loaded.adapter);
    println!();
    if !loaded.context.is_empty() {
        print_context(&loaded.context);
    }
}

fn print_conversation(data: &ConversationData) {
    let meta = &data.metadata;
    println!();
    println!("  {}", meta.title);
    println!("  Format:   {}", meta.format);
    if let Some(source) = &meta.source {
        println!("  Source:   {source}");
    }
    println!("  Messages: {}", data.messages.len());
    println!();

    for message in &data.messages {
        println!(
            "  {:>4}  {:<9} {}",
            message.id,
            message.kind.to_string(),
            preview(&message.content)
        );
    }
    println!();
}

fn print_context(items: &[ContextItem]) {
    println!("  Context files: {}", items.len());
    for item in items {
        let range: Vec<String> = item.message_range.iter().map(u32::to_string).collect();
        println!(
            "  {:<24} {:<9} messages {}",
            item.filename,
            item.kind.to_string(),
            range.join(",")
        );
    }
    println!();
}

/// First line of a message, cut to [`PREVIEW_CHARS`].
fn preview(content: &str) -> String {
    let first = content.lines().next().unwrap_or_default();
    let mut out: String = first.chars().take(PREVIEW_CHARS).collect();
    if first.chars().count() > PREVIEW_CHARS || content.lines().nth(1).is_some() {
        out.push_str(" …");
    }
    out
}
