#![deny(unsafe_code)]

mod error;
mod render;
mod repl;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitinsp_client::{
    BackendClient, ContentFormat, IndexRegistry, IndexSelection, SettingsStore,
    StreamingChatClient,
};
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

use crate::error::{CliResult, ClientSnafu, RenderSettingsSnafu, TerminalSnafu};
use crate::render::{selection_lines, stream_to_stdout};
use crate::repl::Repl;

pub const DEFAULT_LINK: &str = "https://github.com/atomwalk12/PPS-22-git-insp";
pub const DEFAULT_EXTENSIONS: &str = "scala,md";

/// Terminal client for the gitinsp backend.
#[derive(Debug, Parser)]
#[command(name = "gitinsp", version, about)]
struct Cli {
    /// Backend base URL for this invocation, overriding settings.
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// Settings file to read instead of the per-user default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask a question and stream the answer.
    Chat {
        message: String,
        /// Index to answer from; omit to chat without one.
        #[arg(long)]
        index: Option<String>,
    },
    /// List the indexes known to the backend.
    Indexes,
    /// Build an index from a repository or URL and select it.
    Generate {
        #[arg(default_value = DEFAULT_LINK)]
        link: String,
        /// File extensions to include, comma separated.
        #[arg(long, default_value = DEFAULT_EXTENSIONS)]
        extensions: String,
    },
    /// Delete an index on the backend.
    Remove { name: String },
    /// Show the content behind a link, converted by the backend.
    Fetch {
        #[arg(default_value = DEFAULT_LINK)]
        link: String,
        /// One of: Github, "Plain Text", Markdown, Summary.
        #[arg(long, default_value_t = ContentFormat::Github)]
        format: ContentFormat,
        #[arg(long, default_value = DEFAULT_EXTENSIONS)]
        extensions: String,
    },
    /// Interactive session that keeps an index selected between questions.
    Repl,
    /// Inspect or change persisted settings.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    SetBackend { url: String },
}

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    // Diagnostics go to stderr so stdout carries only answers and content.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = match &cli.config {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::load(),
    };

    if let Command::Config { action } = &cli.command {
        return run_config(&store, action);
    }

    let mut settings = store.settings().as_ref().clone();
    if let Some(backend_url) = &cli.backend_url {
        settings = settings.with_backend_url(backend_url.as_str());
    }
    let backend = BackendClient::new(&settings).context(ClientSnafu {
        stage: "build-backend-client",
    })?;
    tracing::debug!(backend_url = backend.base_url(), "using backend");
    let chat = StreamingChatClient::new(backend.clone());
    let registry = IndexRegistry::new(backend);

    match cli.command {
        Command::Chat { message, index } => {
            stream_to_stdout(&chat, &message, index.as_deref())
                .await
                .context(TerminalSnafu {
                    stage: "render-chat-stream",
                })?;
        }
        Command::Indexes => {
            let selection = IndexSelection::from_descriptors(registry.refresh().await);
            print_lines(selection_lines(&selection));
        }
        Command::Generate { link, extensions } => {
            let current = registry.reload(&IndexSelection::new()).await;
            let update = registry.create_index(&current, &link, &extensions).await;
            println!("{}", update.message);
            if let Some(selection) = update.selection {
                print_lines(selection_lines(&selection));
            }
        }
        Command::Remove { name } => {
            let current = registry.reload(&IndexSelection::new()).await;
            let update = registry.remove_index(&current, &name).await;
            println!("{}", update.message);
            if let Some(selection) = update.selection {
                print_lines(selection_lines(&selection));
            }
        }
        Command::Fetch {
            link,
            format,
            extensions,
        } => {
            println!(
                "{}",
                registry
                    .fetch_content(&link, format.as_str(), &extensions)
                    .await
            );
        }
        Command::Repl => Repl::new(chat, registry).run().await?,
        Command::Config { .. } => {}
    }

    Ok(())
}

fn run_config(store: &SettingsStore, action: &ConfigCommand) -> CliResult<()> {
    match action {
        ConfigCommand::Show => {
            let rendered =
                serde_json::to_string_pretty(store.settings().as_ref()).context(
                    RenderSettingsSnafu {
                        stage: "render-settings-json",
                    },
                )?;
            println!("# {}", store.config_path().display());
            println!("{rendered}");
        }
        ConfigCommand::SetBackend { url } => {
            let settings = store.settings().as_ref().clone().with_backend_url(url.as_str());
            store.update(settings).context(ClientSnafu {
                stage: "persist-settings",
            })?;
            println!("backend set to {}", store.settings().backend_url);
        }
    }

    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
