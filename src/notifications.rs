//! Notification bridge
//!
//! Folds reminder events from the notification feed into the transcript as
//! settled system entries, and runs the background task that consumes the
//! feed for the lifetime of a session.

use crate::protocol::{NotificationEvent, ReminderItem};
use crate::transcript::{Message, Transcript};
use crate::transport::Transport;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Display line for one reminder item
pub fn reminder_line(item: &ReminderItem) -> String {
    match &item.due_date {
        Some(due) => format!("{}: {} (due {due})", item.status.label(), item.title),
        None => format!("{}: {}", item.status.label(), item.title),
    }
}

/// Transcript entries for a feed event; empty for everything but reminders.
pub fn reminder_messages(event: &NotificationEvent) -> Vec<Message> {
    match event {
        NotificationEvent::Reminder { items, .. } => items
            .iter()
            .map(|item| Message::system(reminder_line(item)))
            .collect(),
        NotificationEvent::Heartbeat | NotificationEvent::Other => vec![],
    }
}

/// Merge a feed event into the transcript; returns how many entries it added.
///
/// Entries never displace a streaming tail (see [`Transcript::insert_settled`]).
pub fn merge(event: &NotificationEvent, transcript: &mut Transcript) -> usize {
    let messages = reminder_messages(event);
    let count = messages.len();
    for message in messages {
        transcript.insert_settled(message);
    }
    count
}

/// Consume the transport's feed until cancelled, forwarding reminder events.
///
/// Feed errors are logged and swallowed; reconnecting is the transport's job.
/// The task also ends when the receiving session has gone away.
pub fn spawn_bridge(
    transport: Arc<dyn Transport>,
    forward: mpsc::Sender<NotificationEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut feed = transport.notification_feed();
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => break,
                next = feed.next() => next,
            };
            match next {
                Some(Ok(event @ NotificationEvent::Reminder { .. })) => {
                    if forward.send(event).await.is_err() {
                        break;
                    }
                }
                Some(Ok(NotificationEvent::Heartbeat | NotificationEvent::Other)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, kind = ?e.kind, "Notification feed error");
                }
                None => {
                    tracing::info!("Notification feed ended");
                    break;
                }
            }
        }
        tracing::debug!("Notification bridge stopped");
    })
}
