//! Interactive terminal chat over a fixed set of PDFs.
//!
//! One implicit session: the documents named on the command line are indexed
//! at start-up and every question is answered against them. Lines starting
//! with `/` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/reload` | Re-read and re-index the documents; clears the history |
//! | `/history` | Print the conversation so far |
//! | `/quit` | Exit (end of input does the same) |

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::files::read_documents;
use crate::llm::ensure_api_key;
use crate::session::Session;

const SESSION_ID: &str = "terminal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ChatRepl {
    assistant: Assistant,
    paths: Vec<PathBuf>,
    session: Option<Session>,
}

impl ChatRepl {
    pub fn new(assistant: Assistant, paths: Vec<PathBuf>) -> Self {
        Self {
            assistant,
            paths,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Indexes the documents again. On failure the previous index (if any)
    /// stays in place and the error is reported.
    pub async fn reload(&mut self, out: &mut impl Write) -> Result<()> {
        let documents = match read_documents(&self.paths) {
            Ok(documents) => documents,
            Err(e) => {
                writeln!(out, "Could not read documents: {:#}", e)?;
                return Ok(());
            }
        };

        match self.assistant.build_index(documents).await {
            Ok(upload) => {
                for skipped in &upload.report.skipped {
                    writeln!(out, "Skipped {}: {}", skipped.name, skipped.reason)?;
                }
                writeln!(
                    out,
                    "Indexed {} document(s) into {} chunks.",
                    upload.report.processed.len(),
                    upload.index.len()
                )?;
                self.session = Some(Session::new(SESSION_ID, upload.index));
            }
            Err(e) => {
                warn!(error = %e, "indexing failed");
                writeln!(out, "Indexing failed: {}", e)?;
            }
        }
        Ok(())
    }

    /// Handles one input line.
    pub async fn handle_line(&mut self, line: &str, out: &mut impl Write) -> Result<Flow> {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => return Ok(Flow::Quit),
            "/reload" => self.reload(out).await?,
            "/history" => match &self.session {
                Some(session) if !session.history.is_empty() => {
                    writeln!(out, "{}", session.history.render())?;
                }
                _ => writeln!(out, "(no history yet)")?,
            },
            command if command.starts_with('/') => {
                writeln!(out, "Unknown command {}. Try /reload, /history or /quit.", command)?;
            }
            question => match self.session.as_mut() {
                None => {
                    writeln!(out, "No documents are indexed yet; use /reload.")?;
                }
                Some(session) => match self.assistant.ask(session, question).await {
                    Ok(answer) => {
                        writeln!(out, "{}", answer.answer)?;
                        for source in &answer.sources {
                            writeln!(
                                out,
                                "  [chunk {} | {:.3}] {}",
                                source.chunk_index,
                                source.score,
                                snippet(&source.text, 80)
                            )?;
                        }
                    }
                    Err(e) => writeln!(out, "Error: {}", e)?,
                },
            },
        }
        Ok(Flow::Continue)
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// Runs the chat loop on stdin/stdout until `/quit` or end of input.
pub async fn run_chat(config: &Config, paths: Vec<PathBuf>) -> Result<()> {
    ensure_api_key(&config.llm)?;
    let assistant = Assistant::from_config(config)?;
    let mut repl = ChatRepl::new(assistant, paths);

    let mut stdout = std::io::stdout();
    repl.reload(&mut stdout).await?;
    writeln!(stdout, "Ask a question, or /reload, /history, /quit.")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if repl.handle_line(&line, &mut stdout).await? == Flow::Quit {
            break;
        }
    }
    Ok(())
}
