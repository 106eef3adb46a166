use gitinsp_client::{ContentFormat, IndexRegistry, IndexSelection, StreamingChatClient};
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{CliResult, TerminalSnafu};
use crate::render::{selection_lines, stream_to_stdout};
use crate::{DEFAULT_EXTENSIONS, DEFAULT_LINK};

const HELP: &str = "\
commands:
  <message>                        ask about the active index
  /indexes                         reload indexes from the backend
  /use <name>                      select an index
  /clear                           chat without an index
  /generate [link] [extensions]    build an index and select it
  /remove <name>                   delete an index
  /fetch [link] [format] [ext]     show converted link content
                                   format: github, plain-text, markdown, summary
  /help                            show this text
  /quit                            leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Chat(String),
    Indexes,
    Use(String),
    Clear,
    Generate {
        link: String,
        extensions: String,
    },
    Remove(String),
    Fetch {
        link: String,
        format: ContentFormat,
        extensions: String,
    },
    Help,
    Quit,
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Chat(line.to_string());
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args = words.collect::<Vec<_>>();
        let arg = |position: usize, fallback: &str| {
            args.get(position)
                .map(|value| value.to_string())
                .unwrap_or_else(|| fallback.to_string())
        };

        match (name, args.len()) {
            ("indexes" | "load", 0) => Self::Indexes,
            ("use", 1) => Self::Use(arg(0, "")),
            ("clear", 0) => Self::Clear,
            ("generate", 0..=2) => Self::Generate {
                link: arg(0, DEFAULT_LINK),
                extensions: arg(1, DEFAULT_EXTENSIONS),
            },
            ("remove", 1) => Self::Remove(arg(0, "")),
            ("fetch", 0..=3) => match args.get(1).map(|raw| raw.parse::<ContentFormat>()) {
                Some(Err(reason)) => Self::Invalid(reason),
                format => Self::Fetch {
                    link: arg(0, DEFAULT_LINK),
                    format: format.and_then(Result::ok).unwrap_or_default(),
                    extensions: arg(2, DEFAULT_EXTENSIONS),
                },
            },
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Invalid(format!("unrecognized command '/{command}', try /help")),
        }
    }
}

/// Interactive session holding the index selection between turns.
pub struct Repl {
    chat: StreamingChatClient,
    registry: IndexRegistry,
    selection: IndexSelection,
}

impl Repl {
    pub fn new(chat: StreamingChatClient, registry: IndexRegistry) -> Self {
        Self {
            chat,
            registry,
            selection: IndexSelection::new(),
        }
    }

    pub async fn run(mut self) -> CliResult<()> {
        self.selection = self.registry.reload(&self.selection).await;
        println!("{HELP}");
        self.print_selection();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let Some(line) = lines.next_line().await.context(TerminalSnafu {
                stage: "read-repl-line",
            })?
            else {
                break;
            };

            if !self.execute(ReplCommand::parse(&line)).await? {
                break;
            }
        }

        Ok(())
    }

    /// Runs one command; `false` ends the session.
    async fn execute(&mut self, command: ReplCommand) -> CliResult<bool> {
        match command {
            ReplCommand::Empty => {}
            ReplCommand::Chat(message) => {
                stream_to_stdout(&self.chat, &message, self.selection.active())
                    .await
                    .context(TerminalSnafu {
                        stage: "render-chat-stream",
                    })?;
            }
            ReplCommand::Indexes => {
                self.selection = self.registry.reload(&self.selection).await;
                self.print_selection();
            }
            ReplCommand::Use(name) => match self.selection.clone().select(&name) {
                Ok(selection) => {
                    self.selection = selection;
                    self.print_selection();
                }
                Err(error) => println!("{error}"),
            },
            ReplCommand::Clear => {
                self.selection = self.selection.clone().clear_active();
                self.print_selection();
            }
            ReplCommand::Generate { link, extensions } => {
                println!("generating index for {link} ({extensions}), this can take minutes...");
                let update = self
                    .registry
                    .create_index(&self.selection, &link, &extensions)
                    .await;
                self.apply(update.message, update.selection);
            }
            ReplCommand::Remove(name) => {
                let update = self.registry.remove_index(&self.selection, &name).await;
                self.apply(update.message, update.selection);
            }
            ReplCommand::Fetch {
                link,
                format,
                extensions,
            } => {
                let content = self
                    .registry
                    .fetch_content(&link, format.as_str(), &extensions)
                    .await;
                println!("{content}");
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => return Ok(false),
            ReplCommand::Invalid(reason) => println!("{reason}"),
        }

        Ok(true)
    }

    fn apply(&mut self, message: String, selection: Option<IndexSelection>) {
        println!("{message}");
        if let Some(selection) = selection {
            self.selection = selection;
            self.print_selection();
        }
    }

    fn print_selection(&self) {
        for line in selection_lines(&self.selection) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_chat_messages() {
        assert_eq!(
            ReplCommand::parse("  what does this repo do?  "),
            ReplCommand::Chat("what does this repo do?".to_string())
        );
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn generate_and_fetch_fall_back_to_defaults() {
        assert_eq!(
            ReplCommand::parse("/generate"),
            ReplCommand::Generate {
                link: DEFAULT_LINK.to_string(),
                extensions: DEFAULT_EXTENSIONS.to_string(),
            }
        );
        assert_eq!(
            ReplCommand::parse("/fetch https://github.com/org/repo plain-text rs"),
            ReplCommand::Fetch {
                link: "https://github.com/org/repo".to_string(),
                format: ContentFormat::PlainText,
                extensions: "rs".to_string(),
            }
        );
        assert_eq!(
            ReplCommand::parse("/fetch"),
            ReplCommand::Fetch {
                link: DEFAULT_LINK.to_string(),
                format: ContentFormat::Github,
                extensions: DEFAULT_EXTENSIONS.to_string(),
            }
        );
    }

    #[test]
    fn index_commands_take_one_name() {
        assert_eq!(
            ReplCommand::parse("/use repoA"),
            ReplCommand::Use("repoA".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/remove repoA"),
            ReplCommand::Remove("repoA".to_string())
        );
        assert!(matches!(ReplCommand::parse("/use"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/remove a b"), ReplCommand::Invalid(_)));
    }

    #[test]
    fn every_format_listed_in_help_parses() {
        let listed = HELP
            .lines()
            .find_map(|line| line.trim().strip_prefix("format: "))
            .expect("help lists formats");
        for name in listed.split(", ") {
            let command = ReplCommand::parse(&format!("/fetch {DEFAULT_LINK} {name}"));
            assert!(matches!(command, ReplCommand::Fetch { .. }), "{name}");
        }
        assert_eq!(listed.split(", ").count(), ContentFormat::ALL.len());
    }

    #[test]
    fn unknown_formats_and_commands_are_invalid() {
        assert!(matches!(
            ReplCommand::parse("/fetch link pdf"),
            ReplCommand::Invalid(reason) if reason.contains("pdf")
        ));
        assert!(matches!(ReplCommand::parse("/frobnicate"), ReplCommand::Invalid(_)));
        assert_eq!(ReplCommand::parse("/exit"), ReplCommand::Quit);
    }
}
