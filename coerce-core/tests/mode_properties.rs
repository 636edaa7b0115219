//! Property tests for request rewriting

mod common;

use common::User;
use coerce_core::modes::{apply, merge_consecutive_messages, Target};
use coerce_core::protocol::MessageRole;
use coerce_core::{ChatRequest, Message, Mode, SchemaAdapter};
use proptest::prelude::*;

fn message() -> impl Strategy<Value = Message> {
    (0u8..3, "[a-z ]{0,12}").prop_map(|(role, text)| match role {
        0 => Message::user(text),
        1 => Message::assistant(text),
        _ => Message::system(text),
    })
}

fn mode() -> impl Strategy<Value = Mode> {
    (0..Mode::ALL.len()).prop_map(|i| Mode::ALL[i])
}

proptest! {
    #[test]
    fn merge_is_idempotent(messages in prop::collection::vec(message(), 0..12)) {
        let once = merge_consecutive_messages(messages);
        let twice = merge_consecutive_messages(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_leaves_no_adjacent_roles(messages in prop::collection::vec(message(), 0..12)) {
        let merged = merge_consecutive_messages(messages);
        for pair in merged.windows(2) {
            prop_assert_ne!(pair[0].role, pair[1].role);
        }
    }

    #[test]
    fn apply_never_touches_caller_request(
        mode in mode(),
        messages in prop::collection::vec(message(), 1..6),
    ) {
        let adapter = SchemaAdapter::<User>::new().unwrap();
        let request = ChatRequest::without_model(messages);
        let before = request.clone();

        if let Ok(rewritten) = apply(mode, &request, Target::One(adapter.describe())) {
            // Something was declared to the provider
            let declared = rewritten.tools.is_some()
                || rewritten.response_format.is_some()
                || rewritten.system.is_some()
                || rewritten.messages.iter().any(|m| m.role == MessageRole::System)
                || !rewritten.extra.is_empty();
            prop_assert!(declared);
        }
        prop_assert_eq!(request, before);
    }
}
