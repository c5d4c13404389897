use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rentarb_cli::cli::commands::{clear_overrides, extra, flag, show_overrides, unflag};
use rentarb_cli::cli::{run_watch, CliConfig, ConversationInput, PushInput, WatchOptions};
use rentarb_core::store::OverrideStore;
use rentarb_core::tracing_setup::init_tracing_with_service;

#[derive(Parser)]
#[command(name = "rentarb")]
#[command(about = "Unread badge for admin support conversations")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (contains dataDir, endpoint, socketPath)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the badge and print each published state as a JSON line
    Watch {
        /// Signed-in admin user id
        #[arg(long, short = 'u')]
        user: String,
        /// Conversation store base URL
        #[arg(long, conflicts_with = "snapshot")]
        endpoint: Option<String>,
        /// JSON file with the conversation list, re-read on every fetch
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Read push events from stdin instead of the push socket
        #[arg(long)]
        stdin: bool,
        /// Push socket path
        #[arg(long, conflicts_with = "stdin")]
        socket: Option<PathBuf>,
    },

    /// Force a conversation (or one message in it) to count as unread
    Flag {
        conversation_id: String,
        #[arg(long, short = 'm')]
        message: Option<String>,
    },

    /// Remove a manual unread flag
    Unflag {
        conversation_id: String,
        #[arg(long, short = 'm')]
        message: Option<String>,
    },

    /// Print the manual override set
    Overrides,

    /// Remove every manual flag
    ClearOverrides,

    /// Print the manual extra for a conversation snapshot file
    Extra {
        snapshot: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing_with_service("rentarb") {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let Some(command) = cli.command else {
        eprintln!("No command specified. Use --help for usage.");
        std::process::exit(1);
    };

    let mut config = load_config(cli.config.as_ref());
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }

    if let Err(e) = run(command, config, cli.pretty) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: CliConfig, pretty: bool) -> Result<()> {
    match command {
        Commands::Watch {
            user,
            endpoint,
            snapshot,
            stdin,
            socket,
        } => {
            let core = config.core_config()?;
            let input = match (endpoint, snapshot) {
                (Some(endpoint), _) => Some(ConversationInput::Endpoint(endpoint)),
                (None, Some(path)) => Some(ConversationInput::Snapshot(path)),
                (None, None) => None,
            };
            let push = if stdin {
                PushInput::Stdin
            } else {
                PushInput::Socket(socket.unwrap_or_else(|| config.socket_path()))
            };
            let options = WatchOptions {
                user_id: user,
                input,
                push,
                pretty,
            };

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_watch(&core, options))
        }
        Commands::Flag {
            conversation_id,
            message,
        } => {
            let store = OverrideStore::open(config.data_dir());
            let changed = flag(&store, &conversation_id, message.as_deref())?;
            print_changed(changed, pretty)
        }
        Commands::Unflag {
            conversation_id,
            message,
        } => {
            let store = OverrideStore::open(config.data_dir());
            let changed = unflag(&store, &conversation_id, message.as_deref())?;
            print_changed(changed, pretty)
        }
        Commands::Overrides => {
            let store = OverrideStore::open(config.data_dir());
            show_overrides(&store, pretty)?;
            Ok(())
        }
        Commands::ClearOverrides => {
            let store = OverrideStore::open(config.data_dir());
            let changed = clear_overrides(&store)?;
            print_changed(changed, pretty)
        }
        Commands::Extra { snapshot } => {
            let store = OverrideStore::open(config.data_dir());
            let manual_extra = extra(&store, &snapshot)?;
            print_value(&serde_json::json!({ "manualExtra": manual_extra }), pretty)
        }
    }
}

fn print_changed(changed: bool, pretty: bool) -> Result<()> {
    print_value(&serde_json::json!({ "changed": changed }), pretty)
}

fn print_value(value: &serde_json::Value, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

/// Load configuration from file, defaulting when no file is given
fn load_config(path: Option<&PathBuf>) -> CliConfig {
    let Some(path) = path else {
        return CliConfig::default();
    };
    match CliConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
