// Interactive chat front end
// A terminal conversation over the same QA pipeline the HTTP endpoint uses


use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;
use crate::pipeline::QaService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation history, kept in memory for display only
///
/// Earlier turns are never sent back to the model; every question is
/// answered on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// A transcript opened by the assistant's greeting
    #[inline]
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut transcript = Self::default();
        transcript.push(Role::Assistant, greeting);
        transcript
    }

    #[inline]
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// One user's conversation
pub struct ChatSession {
    service: Arc<QaService>,
    transcript: Transcript,
}

impl ChatSession {
    #[inline]
    pub fn new(service: Arc<QaService>, greeting: impl Into<String>) -> Self {
        Self {
            service,
            transcript: Transcript::with_greeting(greeting),
        }
    }

    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Record `message`, answer it, and record the answer
    ///
    /// On failure the user turn stays in the transcript and no assistant turn
    /// is added; the session remains usable.
    #[inline]
    pub async fn submit(&mut self, message: &str) -> crate::Result<Turn> {
        self.transcript.push(Role::User, message);
        let answer = self.service.ask(message).await?;

        let turn = Turn {
            role: Role::Assistant,
            content: answer.text,
        };
        self.transcript.turns.push(turn.clone());
        Ok(turn)
    }
}

/// What the REPL should do with one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Quit,
    History,
    Skip,
    Ask(String),
}

impl ChatCommand {
    #[inline]
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Skip,
            "/quit" | "/exit" => Self::Quit,
            "/history" => Self::History,
            question => Self::Ask(question.to_string()),
        }
    }
}

fn print_turn(turn: &Turn) {
    match turn.role {
        Role::User => println!("{} {}", style("you ›").bold().green(), turn.content),
        Role::Assistant => println!("{} {}", style("bot ›").bold().cyan(), turn.content),
    }
}

fn thinking_spinner() -> ProgressBar {
    if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        );
        bar.set_message("Thinking...");
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}

/// Run the terminal chat until `/quit` or end of input
#[inline]
pub async fn run_chat(config: &Config) -> Result<()> {
    let service = Arc::new(
        QaService::from_config(config).context("Failed to initialise the QA pipeline")?,
    );
    service.index().spawn_warmup();

    let mut session = ChatSession::new(service, config.chat.greeting.clone());

    eprintln!("{}", style("💬 RAG QA Chat").bold().cyan());
    eprintln!(
        "{}",
        style("Type a question, /history to review the conversation, /quit to leave.").dim()
    );
    eprintln!();
    for turn in session.transcript().turns() {
        print_turn(turn);
    }

    loop {
        let line: String = match Input::new()
            .with_prompt("Type your question here...")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                warn!("Input closed: {}", e);
                break;
            }
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Quit => break,
            ChatCommand::Skip => {}
            ChatCommand::History => {
                for turn in session.transcript().turns() {
                    print_turn(turn);
                }
            }
            ChatCommand::Ask(question) => {
                let spinner = thinking_spinner();
                let result = session.submit(&question).await;
                spinner.finish_and_clear();

                match result {
                    Ok(turn) => print_turn(&turn),
                    Err(e) => eprintln!("{} {}", style("error ›").bold().red(), e),
                }
            }
        }
    }

    eprintln!("{}", style("Goodbye!").dim());
    Ok(())
}
