//! assistant-chat - terminal client for the personal assistant
//!
//! Reads lines from stdin and prints settled replies and reminders as the
//! session publishes them.

use assistant_session::{
    ClientConfig, HttpTransport, Session, SessionUpdate, Snapshot, Transport, TurnOutcome,
};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const HISTORY_PAGE: u32 = 20;

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(String),
    Edit { index: usize, text: String },
    Regenerate,
    Load(i64),
    Delete(i64),
    History,
    Clear,
    Help,
    Quit,
    Invalid(&'static str),
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return Input::Send(line.to_string());
        };
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        let rest = rest.trim();
        match name {
            "quit" | "exit" => Input::Quit,
            "clear" => Input::Clear,
            "regen" => Input::Regenerate,
            "history" => Input::History,
            "help" => Input::Help,
            "load" => rest
                .parse()
                .map_or(Input::Invalid("usage: /load <conversation id>"), Input::Load),
            "delete" => rest
                .parse()
                .map_or(Input::Invalid("usage: /delete <conversation id>"), Input::Delete),
            "edit" => {
                let (index, text) = rest.split_once(' ').unwrap_or((rest, ""));
                match index.parse() {
                    Ok(index) if !text.trim().is_empty() => Input::Edit {
                        index,
                        text: text.trim().to_string(),
                    },
                    _ => Input::Invalid("usage: /edit <index> <text>"),
                }
            }
            _ => Input::Invalid("unknown command, try /help"),
        }
    }
}

const HELP: &str = "\
/edit N TEXT  replace message N and resend
/regen        regenerate the last reply
/load ID      open a stored conversation
/delete ID    delete a stored conversation
/history      list recent conversations
/clear        start a new conversation
/quit         exit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistant_session=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env();
    if config.api_key.is_none() {
        tracing::warn!("No API key configured. Set ASSISTANT_API_KEY.");
    }
    tracing::info!(base_url = %config.base_url, timezone = %config.timezone, "Connecting");

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
    let session = Session::start(transport, &config).await;
    let printer = tokio::spawn(print_updates(session.updates()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Input::parse(&line) {
            Input::Send(text) if text.is_empty() => {}
            Input::Send(text) => report(session.send_message(&text).await),
            Input::Edit { index, text } => report(session.edit_message(index, &text).await),
            Input::Regenerate => report(session.regenerate_last_response().await),
            Input::Load(id) => match session.load_conversation(id).await {
                Ok(()) => eprintln!("* loaded conversation #{id}"),
                Err(e) => eprintln!("! {e}"),
            },
            Input::Delete(id) => match session.delete_conversation(id).await {
                Ok(()) => eprintln!("* deleted conversation #{id}"),
                Err(e) => eprintln!("! {e}"),
            },
            Input::History => match session.list_conversations(HISTORY_PAGE, 0).await {
                Ok(conversations) => {
                    for c in conversations {
                        println!(
                            "#{} {} ({} messages)",
                            c.id,
                            c.title.as_deref().unwrap_or("untitled"),
                            c.message_count
                        );
                    }
                }
                Err(e) => eprintln!("! {e}"),
            },
            Input::Clear => session.clear_conversation().await?,
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
            Input::Invalid(usage) => eprintln!("! {usage}"),
        }
    }

    session.close().await;
    printer.abort();
    Ok(())
}

fn report(result: Result<Option<TurnOutcome>, assistant_session::SessionError>) {
    match result {
        Ok(Some(TurnOutcome::Completed) | None) => {}
        Ok(Some(outcome)) => tracing::debug!(outcome = ?outcome, "Turn did not complete"),
        Err(e) => eprintln!("! {e}"),
    }
}

enum Line {
    Out(String),
    Err(String),
}

/// Turns session updates into terminal lines. Each settled entry is printed
/// once, with the index `/edit` takes; progress lines go to stderr.
#[derive(Default)]
struct Printer {
    printed: HashSet<Uuid>,
    last_status: Option<String>,
}

impl Printer {
    fn lines(&mut self, update: SessionUpdate) -> Vec<Line> {
        match update {
            SessionUpdate::Transcript(snapshot) => self.transcript_lines(&snapshot),
            SessionUpdate::TitleChanged(title) => vec![Line::Err(format!("# {title}"))],
            SessionUpdate::Connection(false) => vec![Line::Err("! disconnected".to_string())],
            SessionUpdate::Connection(true) => vec![Line::Err("* connected".to_string())],
            SessionUpdate::ConversationAssigned(_) | SessionUpdate::TurnFinished(_) => {
                self.last_status = None;
                Vec::new()
            }
        }
    }

    fn transcript_lines(&mut self, snapshot: &Snapshot) -> Vec<Line> {
        if snapshot.is_empty() {
            self.printed.clear();
        }
        let mut lines = Vec::new();
        for (index, message) in snapshot.iter().enumerate() {
            if message.is_streaming {
                if message.processing_status != self.last_status {
                    if let Some(status) = &message.processing_status {
                        lines.push(Line::Err(format!("… {status}")));
                    }
                    self.last_status.clone_from(&message.processing_status);
                }
            } else if self.printed.insert(message.id) {
                lines.push(Line::Out(format!(
                    "[{index}] {:?}: {}",
                    message.author, message.content
                )));
            }
        }
        lines
    }
}

async fn print_updates(updates: impl Stream<Item = SessionUpdate>) {
    let mut updates = std::pin::pin!(updates);
    let mut printer = Printer::default();
    while let Some(update) = updates.next().await {
        for line in printer.lines(update) {
            match line {
                Line::Out(text) => println!("{text}"),
                Line::Err(text) => eprintln!("{text}"),
            }
        }
    }
}
