//! Streaming conversation sessions for a personal-assistant chat server
//!
//! A [`Session`] keeps one conversation's transcript in sync with a server
//! that streams each reply as a sequence of events, folds background reminder
//! notifications into the same transcript, and publishes every change to
//! observers.

#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod notifications;
pub mod protocol;
pub mod session;
pub mod status;
pub mod transcript;
pub mod transport;
pub mod turn;

pub use config::ClientConfig;
pub use session::{Session, SessionError, SessionSnapshot, SessionUpdate};
pub use transcript::{Author, Message, Snapshot, Transcript};
pub use transport::{HttpTransport, Transport, TransportError, TransportErrorKind};
pub use turn::TurnOutcome;
