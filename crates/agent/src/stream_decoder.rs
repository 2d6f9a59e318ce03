//! Splits a backend fragment stream into a reasoning channel and a content
//! channel.
//!
//! The decoder is fed one [`Fragment`] at a time and returns the display
//! events that fragment produces, in order. Each channel announces itself
//! exactly once (`ReasoningStarted`, `ContentStarted`) before its first text.
//! When the stream ends, [`StreamDecoder::finish`] yields the accumulated
//! content, reasoning trace and tool calls.
//!
//! One decoder per backend reply; it is consumed by `finish` and cannot be
//! restarted.

use colloquy_core::backend::{Fragment, Usage};
use colloquy_core::message::ToolCallRequest;

/// A display event produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// The first reasoning text of this reply is about to follow.
    ReasoningStarted,

    /// A reasoning-channel delta.
    Reasoning(String),

    /// The first content text of this reply is about to follow.
    ContentStarted,

    /// A content-channel delta.
    Content(String),
}

/// Everything accumulated from one streamed reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTurn {
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    has_entered_reasoning: bool,
    has_entered_content: bool,
    done: bool,
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCallRequest>,
    usage: Option<Usage>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and get the events it produces.
    ///
    /// Empty deltas produce nothing and do not open a channel.
    pub fn push(&mut self, fragment: Fragment) -> Vec<DecodedEvent> {
        let mut events = Vec::new();

        if let Some(text) = fragment.reasoning.filter(|t| !t.is_empty()) {
            if !self.has_entered_reasoning {
                self.has_entered_reasoning = true;
                events.push(DecodedEvent::ReasoningStarted);
            }
            self.reasoning.push_str(&text);
            events.push(DecodedEvent::Reasoning(text));
        }

        if let Some(text) = fragment.content.filter(|t| !t.is_empty()) {
            if !self.has_entered_content {
                self.has_entered_content = true;
                events.push(DecodedEvent::ContentStarted);
            }
            self.content.push_str(&text);
            events.push(DecodedEvent::Content(text));
        }

        self.tool_calls.extend(fragment.tool_calls);

        if fragment.usage.is_some() {
            self.usage = fragment.usage;
        }
        if fragment.done {
            self.done = true;
        }

        events
    }

    /// Whether a fragment flagged `done` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn has_entered_reasoning(&self) -> bool {
        self.has_entered_reasoning
    }

    pub fn has_entered_content(&self) -> bool {
        self.has_entered_content
    }

    /// Close the stream and return what was accumulated.
    pub fn finish(self) -> DecodedTurn {
        DecodedTurn {
            content: self.content,
            reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
            tool_calls: self.tool_calls,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(fragments: Vec<Fragment>) -> (Vec<DecodedEvent>, DecodedTurn) {
        let mut decoder = StreamDecoder::new();
        let events = fragments.into_iter().flat_map(|f| decoder.push(f)).collect();
        (events, decoder.finish())
    }

    #[test]
    fn reasoning_then_content() {
        let (events, turn) = decode_all(vec![
            Fragment::reasoning("Let me "),
            Fragment::reasoning("think."),
            Fragment::content("The answer"),
            Fragment::content(" is 4."),
            Fragment::done(),
        ]);

        assert_eq!(
            events,
            vec![
                DecodedEvent::ReasoningStarted,
                DecodedEvent::Reasoning("Let me ".into()),
                DecodedEvent::Reasoning("think.".into()),
                DecodedEvent::ContentStarted,
                DecodedEvent::Content("The answer".into()),
                DecodedEvent::Content(" is 4.".into()),
            ]
        );
        assert_eq!(turn.content, "The answer is 4.");
        assert_eq!(turn.reasoning.as_deref(), Some("Let me think."));
    }

    #[test]
    fn content_only_still_announces_content() {
        let (events, turn) = decode_all(vec![Fragment::content("Hi"), Fragment::done()]);
        assert_eq!(
            events,
            vec![DecodedEvent::ContentStarted, DecodedEvent::Content("Hi".into())]
        );
        assert!(turn.reasoning.is_none());
    }

    #[test]
    fn markers_fire_at_most_once() {
        let mut fragments = Vec::new();
        for i in 0..5 {
            fragments.push(Fragment::reasoning(format!("r{i}")));
        }
        for i in 0..5 {
            fragments.push(Fragment::content(format!("c{i}")));
        }
        let (events, _) = decode_all(fragments);

        let count = |marker: DecodedEvent| events.iter().filter(|e| **e == marker).count();
        assert_eq!(count(DecodedEvent::ReasoningStarted), 1);
        assert_eq!(count(DecodedEvent::ContentStarted), 1);

        let position = |pred: fn(&DecodedEvent) -> bool| events.iter().position(pred).unwrap();
        let rs = position(|e| *e == DecodedEvent::ReasoningStarted);
        let cs = position(|e| *e == DecodedEvent::ContentStarted);
        let first_reasoning = position(|e| matches!(e, DecodedEvent::Reasoning(_)));
        let first_content = position(|e| matches!(e, DecodedEvent::Content(_)));
        assert!(rs < first_reasoning);
        assert!(first_reasoning < cs);
        assert!(cs < first_content);
    }

    #[test]
    fn fragment_with_both_channels_keeps_reasoning_first() {
        let fragment = Fragment {
            reasoning: Some("hmm".into()),
            content: Some("ok".into()),
            ..Fragment::default()
        };
        let (events, _) = decode_all(vec![fragment]);
        assert_eq!(
            events,
            vec![
                DecodedEvent::ReasoningStarted,
                DecodedEvent::Reasoning("hmm".into()),
                DecodedEvent::ContentStarted,
                DecodedEvent::Content("ok".into()),
            ]
        );
    }

    #[test]
    fn empty_deltas_are_ignored() {
        let (events, turn) = decode_all(vec![
            Fragment::reasoning(""),
            Fragment::content(""),
            Fragment::done(),
        ]);
        assert!(events.is_empty());
        assert_eq!(turn, DecodedTurn::default());
    }

    #[test]
    fn tool_calls_accumulate_in_order() {
        let mut decoder = StreamDecoder::new();
        decoder.push(Fragment::tool_calls(vec![ToolCallRequest::new(
            "addNumbers",
            json!({"array": [1, 2]}),
        )]));
        decoder.push(Fragment::tool_calls(vec![ToolCallRequest::new(
            "divideTwoNumbers",
            json!({"a": 4, "b": 2}),
        )]));
        assert!(!decoder.is_done());

        let mut last = Fragment::done();
        last.usage = Some(Usage {
            prompt_tokens: 12,
            completion_tokens: 3,
            total_tokens: 15,
        });
        decoder.push(last);
        assert!(decoder.is_done());

        let turn = decoder.finish();
        let names: Vec<&str> = turn.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["addNumbers", "divideTwoNumbers"]);
        assert_eq!(turn.usage.map(|u| u.total_tokens), Some(15));
        assert!(turn.content.is_empty());
    }
}
