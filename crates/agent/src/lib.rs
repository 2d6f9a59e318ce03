//! The tool-orchestration engine.
//!
//! A turn follows a **Request → Execute → Request** cycle:
//!
//! 1. **Append** the user message to the conversation
//! 2. **Send** the conversation and the declared tools to the backend
//! 3. **If tool calls**: run them in order, append one result per call,
//!    and go back to step 2
//! 4. **If plain content**: append it as the assistant's answer and return
//!
//! The cycle ends with a plain answer, a backend failure, or when the
//! iteration bound is hit. Streamed replies pass through a
//! [`StreamDecoder`] that separates reasoning text from answer text.

pub mod loop_runner;
pub mod stream_decoder;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{OrchestrationLoop, TurnOutput};
pub use stream_decoder::{DecodedEvent, DecodedTurn, StreamDecoder};
pub use stream_event::AgentStreamEvent;
