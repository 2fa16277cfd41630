//! Property-based tests for the turn controller
//!
//! Random turn event sequences interleaved with reminder merges must keep the
//! transcript's structural invariants.

use super::*;
use crate::notifications;
use crate::protocol::{NotificationEvent, ReminderItem, ReminderStatus};
use crate::status::{GENERIC_COMPLETED, GENERIC_STARTED, GENERIC_SYNTHESIZING, KNOWN_FUNCTIONS};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Event(TurnEvent),
    Reminder(Vec<ReminderItem>),
    Fault,
}

fn arb_function_name() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::sample::select(KNOWN_FUNCTIONS).prop_map(str::to_string),
        "[a-z_]{1,16}",
    ]
}

fn arb_turn_event() -> impl Strategy<Value = TurnEvent> {
    prop_oneof![
        (1i64..1000).prop_map(|conversation_id| TurnEvent::Start { conversation_id }),
        arb_function_name().prop_map(|function_name| TurnEvent::FunctionStart { function_name }),
        proptest::option::of(arb_function_name()).prop_map(|function_name| {
            TurnEvent::FunctionResult {
                function_name,
                result: json!({"ok": true}),
            }
        }),
        "[a-zA-Z ]{0,12}".prop_map(|content| TurnEvent::Chunk { content }),
        "[a-zA-Z ]{0,12}".prop_map(|content| TurnEvent::Chunk { content }),
        proptest::option::of("[a-zA-Z ]{0,12}").prop_map(|content| TurnEvent::Done {
            content,
            actions: None
        }),
        "[A-Za-z ]{1,12}".prop_map(|title| TurnEvent::TitleGenerated { title }),
        "[a-z ]{1,12}".prop_map(|message| TurnEvent::Error { message }),
    ]
}

fn arb_reminder_item() -> impl Strategy<Value = ReminderItem> {
    (
        "[A-Za-z ]{1,12}",
        any::<bool>(),
        proptest::option::of("2024-0[1-9]-1[0-9]"),
    )
        .prop_map(|(title, overdue, due_date)| ReminderItem {
            title,
            status: if overdue {
                ReminderStatus::Overdue
            } else {
                ReminderStatus::DueSoon
            },
            due_date,
        })
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => arb_turn_event().prop_map(Step::Event),
        2 => proptest::collection::vec(arb_reminder_item(), 0..3).prop_map(Step::Reminder),
        1 => Just(Step::Fault),
    ]
}

fn arb_session_script() -> impl Strategy<Value = Vec<Vec<Step>>> {
    proptest::collection::vec(proptest::collection::vec(arb_step(), 0..12), 1..4)
}

// ============================================================================
// Invariant Checks
// ============================================================================

fn assert_single_streaming_tail(transcript: &Transcript) {
    let snapshot = transcript.snapshot();
    let streaming: Vec<usize> = snapshot
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_streaming)
        .map(|(i, _)| i)
        .collect();
    assert!(streaming.len() <= 1, "multiple streaming entries: {streaming:?}");
    if let Some(index) = streaming.first() {
        assert_eq!(*index, snapshot.len() - 1, "streaming entry is not the tail");
    }
    for message in snapshot.iter().filter(|m| !m.is_streaming) {
        assert!(message.processing_status.is_none(), "settled entry kept progress text");
    }
}

fn apply_step(turn: &mut TurnState, transcript: &mut Transcript, step: Step) {
    match step {
        Step::Event(event) => {
            turn.apply(event, transcript).unwrap();
        }
        Step::Reminder(items) => {
            notifications::merge(&NotificationEvent::Reminder { timestamp: None, items }, transcript);
        }
        Step::Fault => {
            turn.fail(
                transcript,
                TurnOutcome::Faulted {
                    error: "reset".to_string(),
                },
            )
            .unwrap();
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_single_streaming_tail(script in arb_session_script()) {
        let mut transcript = Transcript::new();
        for (n, steps) in script.into_iter().enumerate() {
            let mut turn = TurnState::begin(&mut transcript, Some(format!("message {n}").as_str())).unwrap();
            assert_single_streaming_tail(&transcript);
            for step in steps {
                apply_step(&mut turn, &mut transcript, step);
                assert_single_streaming_tail(&transcript);
            }
            turn.fail(&mut transcript, TurnOutcome::Exhausted).unwrap();
            assert_single_streaming_tail(&transcript);
            prop_assert!(!transcript.has_streaming_tail());
        }
    }

    #[test]
    fn prop_turn_never_rewrites_prefix(script in arb_session_script()) {
        let mut transcript = Transcript::new();
        for (n, steps) in script.into_iter().enumerate() {
            let before = transcript.snapshot();
            let mut turn = TurnState::begin(&mut transcript, Some(format!("message {n}").as_str())).unwrap();
            for step in steps {
                apply_step(&mut turn, &mut transcript, step);
            }
            turn.fail(&mut transcript, TurnOutcome::Exhausted).unwrap();

            let after = transcript.snapshot();
            prop_assert!(after.len() >= before.len() + 2);
            prop_assert_eq!(&after[..before.len()], &before[..]);
        }
    }

    #[test]
    fn prop_every_turn_settles_with_one_reply(steps in proptest::collection::vec(arb_step(), 0..16)) {
        let mut transcript = Transcript::new();
        let mut turn = TurnState::begin(&mut transcript, Some("hello")).unwrap();
        for step in steps {
            apply_step(&mut turn, &mut transcript, step);
        }
        let effects = turn.fail(&mut transcript, TurnOutcome::Exhausted).unwrap();
        prop_assert!(turn.is_finished());

        // Reminders may land after a settled reply; the reply itself is the
        // only assistant entry.
        let snapshot = transcript.snapshot();
        let replies: Vec<_> = snapshot
            .iter()
            .filter(|m| m.author == crate::transcript::Author::Assistant)
            .collect();
        prop_assert_eq!(replies.len(), 1);
        prop_assert!(replies[0].is_settled());
        prop_assert!(snapshot.iter().all(|m| !m.is_streaming));
        if !effects.is_empty() {
            prop_assert_eq!(replies[0].content.as_str(), CONNECTION_FAILURE_REPLY);
        }
    }

    #[test]
    fn prop_resolver_is_pure_and_total(name in "[a-z_]{0,24}") {
        for phase in [Phase::Started, Phase::Completed, Phase::Synthesizing] {
            let first = status::resolve(&name, phase);
            prop_assert_eq!(first, status::resolve(&name, phase));
            if !status::is_known(&name) {
                let generic = match phase {
                    Phase::Started => GENERIC_STARTED,
                    Phase::Completed => GENERIC_COMPLETED,
                    Phase::Synthesizing => GENERIC_SYNTHESIZING,
                };
                prop_assert_eq!(first, generic);
            }
        }
    }
}
