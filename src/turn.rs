//! Turn controller
//!
//! Applies one turn's event stream to the transcript. The controller owns the
//! turn's ephemeral context (accumulated reply text, active function) and
//! reports session-level consequences as [`Effect`]s for the caller to carry
//! out, so it never touches conversation metadata or observers itself.

use crate::protocol::TurnEvent;
use crate::status::{self, Phase};
use crate::transcript::{Message, Transcript, TranscriptError};

#[cfg(test)]
mod proptests;

/// Tail content after the server reported an `error` event
pub const ERROR_REPLY: &str =
    "Sorry, something went wrong while preparing a response. Please try again.";
/// Tail content after the stream failed or ended without a terminal event
pub const CONNECTION_FAILURE_REPLY: &str =
    "I couldn't reach the assistant. Please check your connection and try again.";
/// Tail content after the session abandoned the turn
pub const CANCELLED_REPLY: &str = "Response cancelled.";

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A `done` event settled the reply
    Completed,
    /// The server sent an `error` event
    Rejected { message: String },
    /// The event stream raised a transport fault
    Faulted { error: String },
    /// The stream ended without `done` or `error`
    Exhausted,
    /// The session abandoned the turn
    Cancelled,
}

impl TurnOutcome {
    fn failure_reply(&self) -> &'static str {
        match self {
            TurnOutcome::Completed | TurnOutcome::Rejected { .. } => ERROR_REPLY,
            TurnOutcome::Faulted { .. } | TurnOutcome::Exhausted => CONNECTION_FAILURE_REPLY,
            TurnOutcome::Cancelled => CANCELLED_REPLY,
        }
    }
}

/// Consequences of an applied event beyond the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Server assigned (or confirmed) the conversation id
    AssignConversation(i64),
    SetTitle(String),
    SetConnected(bool),
    /// Terminal; the turn accepts no further events
    Finish(TurnOutcome),
}

/// Per-turn ephemeral state
#[derive(Debug, Default)]
pub struct TurnState {
    accumulated: String,
    active_function: Option<String>,
    finished: bool,
}

impl TurnState {
    /// Open a turn: append the user entry (unless resending) and the
    /// streaming placeholder that later events evolve.
    pub fn begin(transcript: &mut Transcript, user_text: Option<&str>) -> Result<Self, TranscriptError> {
        if transcript.has_streaming_tail() {
            return Err(TranscriptError::InvalidState(
                "a streaming message is already in flight",
            ));
        }
        if let Some(text) = user_text {
            transcript.append(Message::user(text));
        }
        transcript.append(Message::placeholder());
        Ok(Self::default())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn active_function(&self) -> Option<&str> {
        self.active_function.as_deref()
    }

    /// Apply one event. Events after the terminal one are ignored.
    pub fn apply(
        &mut self,
        event: TurnEvent,
        transcript: &mut Transcript,
    ) -> Result<Vec<Effect>, TranscriptError> {
        if self.finished {
            tracing::debug!(event = event.kind(), "Ignoring event after terminal");
            return Ok(vec![]);
        }

        match event {
            TurnEvent::Start { conversation_id } => Ok(vec![
                Effect::AssignConversation(conversation_id),
                Effect::SetConnected(true),
            ]),

            TurnEvent::FunctionStart { function_name } => {
                let mut tail = streaming_tail(transcript)?;
                tail.content.clear();
                tail.is_function_call = true;
                tail.processing_status =
                    Some(status::resolve(&function_name, Phase::Started).to_string());
                tail.function_name = Some(function_name.clone());
                transcript.replace_tail(tail)?;
                self.active_function = Some(function_name);
                Ok(vec![])
            }

            TurnEvent::FunctionResult {
                function_name,
                result,
            } => {
                let name = function_name.or_else(|| self.active_function.clone());
                let mut tail = streaming_tail(transcript)?;
                tail.content.clear();
                tail.is_function_call = true;
                tail.processing_status = Some(
                    status::resolve(name.as_deref().unwrap_or_default(), Phase::Completed)
                        .to_string(),
                );
                tail.function_name = name;
                tail.function_result = Some(result);
                transcript.replace_tail(tail)?;
                Ok(vec![])
            }

            TurnEvent::Chunk { content } => {
                self.accumulated.push_str(&content);
                let mut tail = streaming_tail(transcript)?;
                tail.content.clone_from(&self.accumulated);
                tail.processing_status = self
                    .active_function
                    .as_deref()
                    .map(|name| status::resolve(name, Phase::Synthesizing).to_string());
                transcript.replace_tail(tail)?;
                Ok(vec![])
            }

            TurnEvent::Done { content, actions } => {
                let mut tail = streaming_tail(transcript)?;
                tail.content = content
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| std::mem::take(&mut self.accumulated));
                tail.is_streaming = false;
                tail.processing_status = None;
                if actions.is_some() {
                    tail.actions = actions;
                }
                transcript.replace_tail(tail)?;
                self.finished = true;
                Ok(vec![Effect::Finish(TurnOutcome::Completed)])
            }

            TurnEvent::TitleGenerated { title } => Ok(vec![Effect::SetTitle(title)]),

            TurnEvent::Error { message } => {
                tracing::warn!(error = %message, "Server reported turn error");
                self.settle(transcript, TurnOutcome::Rejected { message })
            }
        }
    }

    /// Settle a turn that ended without `done`: fault, exhaustion, or
    /// cancellation. Idempotent; only the first call has any effect.
    pub fn fail(
        &mut self,
        transcript: &mut Transcript,
        outcome: TurnOutcome,
    ) -> Result<Vec<Effect>, TranscriptError> {
        if self.finished {
            return Ok(vec![]);
        }
        self.settle(transcript, outcome)
    }

    fn settle(
        &mut self,
        transcript: &mut Transcript,
        outcome: TurnOutcome,
    ) -> Result<Vec<Effect>, TranscriptError> {
        self.finished = true;
        if transcript.has_streaming_tail() {
            transcript.replace_tail(Message::assistant(outcome.failure_reply()))?;
        }
        let mut effects = Vec::with_capacity(2);
        if !matches!(outcome, TurnOutcome::Cancelled) {
            effects.push(Effect::SetConnected(false));
        }
        effects.push(Effect::Finish(outcome));
        Ok(effects)
    }
}

/// Copy of the in-flight tail, which must still be streaming.
fn streaming_tail(transcript: &Transcript) -> Result<Message, TranscriptError> {
    match transcript.tail() {
        Some(tail) if tail.is_streaming => Ok(tail.clone()),
        Some(_) => Err(TranscriptError::InvalidState("transcript tail is not streaming")),
        None => Err(TranscriptError::InvalidState("transcript is empty")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Author;
    use serde_json::json;

    fn run(transcript: &mut Transcript, events: Vec<TurnEvent>) -> (TurnState, Vec<Effect>) {
        let mut turn = TurnState::begin(transcript, Some("What's on my calendar today?")).unwrap();
        let mut effects = vec![];
        for event in events {
            effects.extend(turn.apply(event, transcript).unwrap());
        }
        (turn, effects)
    }

    fn chunk(text: &str) -> TurnEvent {
        TurnEvent::Chunk {
            content: text.to_string(),
        }
    }

    #[test]
    fn test_begin_appends_user_and_placeholder() {
        let mut transcript = Transcript::new();
        TurnState::begin(&mut transcript, Some("Hi")).unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.get(0).unwrap().author, Author::User);
        assert_eq!(transcript.get(0).unwrap().content, "Hi");
        let tail = transcript.tail().unwrap();
        assert!(tail.is_streaming);
        assert_eq!(tail.processing_status.as_deref(), Some("Processing…"));
    }

    #[test]
    fn test_begin_without_user_text_only_adds_placeholder() {
        let mut transcript = Transcript::from_messages(vec![Message::user("Hi")]);
        TurnState::begin(&mut transcript, None).unwrap();
        assert_eq!(transcript.len(), 2);
        assert!(transcript.tail().unwrap().is_streaming);
    }

    #[test]
    fn test_begin_rejects_second_streaming_tail() {
        let mut transcript = Transcript::new();
        TurnState::begin(&mut transcript, Some("one")).unwrap();
        let err = TurnState::begin(&mut transcript, Some("two")).unwrap_err();
        assert!(matches!(err, TranscriptError::InvalidState(_)));
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_calendar_happy_path() {
        let mut transcript = Transcript::new();
        let (turn, effects) = run(
            &mut transcript,
            vec![
                TurnEvent::Start { conversation_id: 42 },
                TurnEvent::FunctionStart {
                    function_name: "get_calendar_events".to_string(),
                },
                TurnEvent::FunctionResult {
                    function_name: Some("get_calendar_events".to_string()),
                    result: json!({"events": [{"title": "Standup"}, {"title": "Lunch"}]}),
                },
                chunk("You have "),
                chunk("2 events today."),
                TurnEvent::Done {
                    content: None,
                    actions: None,
                },
            ],
        );

        assert!(turn.is_finished());
        assert_eq!(
            effects,
            vec![
                Effect::AssignConversation(42),
                Effect::SetConnected(true),
                Effect::Finish(TurnOutcome::Completed),
            ]
        );
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.get(0).unwrap().author, Author::User);
        let reply = transcript.tail().unwrap();
        assert_eq!(reply.content, "You have 2 events today.");
        assert!(!reply.is_streaming);
        assert!(reply.is_function_call);
        assert_eq!(reply.function_name.as_deref(), Some("get_calendar_events"));
        assert!(reply.function_result.is_some());
        assert_eq!(reply.processing_status, None);
    }

    #[test]
    fn test_progress_text_follows_function_phases() {
        let mut transcript = Transcript::new();
        let mut turn = TurnState::begin(&mut transcript, Some("weather?")).unwrap();

        turn.apply(
            TurnEvent::FunctionStart {
                function_name: "get_current_weather".to_string(),
            },
            &mut transcript,
        )
        .unwrap();
        assert_eq!(
            transcript.tail().unwrap().processing_status.as_deref(),
            Some(status::resolve("get_current_weather", Phase::Started))
        );
        assert_eq!(turn.active_function(), Some("get_current_weather"));

        turn.apply(
            TurnEvent::FunctionResult {
                function_name: None,
                result: json!({"temp": 21}),
            },
            &mut transcript,
        )
        .unwrap();
        let tail = transcript.tail().unwrap();
        assert_eq!(tail.function_name.as_deref(), Some("get_current_weather"));
        assert_eq!(
            tail.processing_status.as_deref(),
            Some(status::resolve("get_current_weather", Phase::Completed))
        );

        turn.apply(chunk("Sunny"), &mut transcript).unwrap();
        assert_eq!(
            transcript.tail().unwrap().processing_status.as_deref(),
            Some(status::resolve("get_current_weather", Phase::Synthesizing))
        );
    }

    #[test]
    fn test_plain_chunks_clear_progress_text() {
        let mut transcript = Transcript::new();
        let (_, _) = run(&mut transcript, vec![chunk("Hel"), chunk("lo")]);
        let tail = transcript.tail().unwrap();
        assert_eq!(tail.content, "Hello");
        assert!(tail.is_streaming);
        assert_eq!(tail.processing_status, None);
    }

    #[test]
    fn test_done_content_overrides_accumulator() {
        let mut transcript = Transcript::new();
        let (_, _) = run(
            &mut transcript,
            vec![
                chunk("draft"),
                TurnEvent::Done {
                    content: Some("final".to_string()),
                    actions: None,
                },
            ],
        );
        assert_eq!(transcript.tail().unwrap().content, "final");
    }

    #[test]
    fn test_done_attaches_actions() {
        let mut transcript = Transcript::new();
        let action = crate::transcript::Action {
            action_type: "task_created".to_string(),
            payload: json!({"id": 3}),
            message: None,
        };
        let (_, _) = run(
            &mut transcript,
            vec![TurnEvent::Done {
                content: Some("Added.".to_string()),
                actions: Some(vec![action.clone()]),
            }],
        );
        assert_eq!(transcript.tail().unwrap().actions, Some(vec![action]));
    }

    #[test]
    fn test_title_event_leaves_transcript_alone() {
        let mut transcript = Transcript::new();
        let mut turn = TurnState::begin(&mut transcript, Some("Hi")).unwrap();
        let before = transcript.snapshot();
        let effects = turn
            .apply(
                TurnEvent::TitleGenerated {
                    title: "Greetings".to_string(),
                },
                &mut transcript,
            )
            .unwrap();
        assert_eq!(effects, vec![Effect::SetTitle("Greetings".to_string())]);
        assert_eq!(transcript.snapshot(), before);
    }

    #[test]
    fn test_error_event_settles_tail() {
        let mut transcript = Transcript::new();
        let (turn, effects) = run(
            &mut transcript,
            vec![
                chunk("partial"),
                TurnEvent::Error {
                    message: "model overloaded".to_string(),
                },
            ],
        );
        assert!(turn.is_finished());
        assert_eq!(
            effects,
            vec![
                Effect::SetConnected(false),
                Effect::Finish(TurnOutcome::Rejected {
                    message: "model overloaded".to_string()
                }),
            ]
        );
        let tail = transcript.tail().unwrap();
        assert_eq!(tail.content, ERROR_REPLY);
        assert!(tail.is_settled());
    }

    #[test]
    fn test_fault_settles_exactly_once() {
        let mut transcript = Transcript::new();
        let (mut turn, _) = run(&mut transcript, vec![chunk("Check")]);

        let effects = turn
            .fail(
                &mut transcript,
                TurnOutcome::Faulted {
                    error: "connection reset".to_string(),
                },
            )
            .unwrap();
        assert_eq!(effects.len(), 2);
        assert_eq!(transcript.tail().unwrap().content, CONNECTION_FAILURE_REPLY);
        assert!(transcript.tail().unwrap().is_settled());
        let settled = transcript.snapshot();

        assert!(turn.fail(&mut transcript, TurnOutcome::Exhausted).unwrap().is_empty());
        assert!(turn.apply(chunk("late"), &mut transcript).unwrap().is_empty());
        assert_eq!(transcript.snapshot(), settled);
    }

    #[test]
    fn test_fail_after_done_is_noop() {
        let mut transcript = Transcript::new();
        let (mut turn, _) = run(
            &mut transcript,
            vec![TurnEvent::Done {
                content: Some("ok".to_string()),
                actions: None,
            }],
        );
        assert!(turn.fail(&mut transcript, TurnOutcome::Exhausted).unwrap().is_empty());
        assert_eq!(transcript.tail().unwrap().content, "ok");
    }

    #[test]
    fn test_cancel_keeps_connection_state() {
        let mut transcript = Transcript::new();
        let (mut turn, _) = run(&mut transcript, vec![]);
        let effects = turn.fail(&mut transcript, TurnOutcome::Cancelled).unwrap();
        assert_eq!(effects, vec![Effect::Finish(TurnOutcome::Cancelled)]);
        assert_eq!(transcript.tail().unwrap().content, CANCELLED_REPLY);
    }

    #[test]
    fn test_event_without_streaming_tail_is_invalid_state() {
        let mut transcript = Transcript::new();
        let mut turn = TurnState::begin(&mut transcript, Some("Hi")).unwrap();
        transcript.truncate_to(0).unwrap();
        let err = turn.apply(chunk("x"), &mut transcript).unwrap_err();
        assert!(matches!(err, TranscriptError::InvalidState(_)));
    }
}
