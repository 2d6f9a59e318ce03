//! The tool-orchestration loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use colloquy_core::backend::{Backend, GenerationOptions, GenerationRequest, Usage};
use colloquy_core::error::{BackendError, Error};
use colloquy_core::event::{DomainEvent, EventBus};
use colloquy_core::message::{ConversationContext, Message, Role, ToolCallRequest};
use colloquy_core::tool::{ToolRegistry, ToolResult};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream_decoder::StreamDecoder;
use crate::stream_event::AgentStreamEvent;

const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// The final result of one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    /// The final assistant content, as appended to the context
    pub content: String,

    /// Reasoning trace, when reasoning was requested and produced
    pub reasoning: Option<String>,

    /// Backend calls made during the turn
    pub iterations: u32,

    /// Tool invocations made during the turn
    pub tool_calls_made: usize,

    /// Usage summed over every backend call that reported it
    pub usage: Option<Usage>,
}

/// One backend reply, whichever way it was delivered.
struct Reply {
    content: String,
    reasoning: Option<String>,
    tool_calls: Vec<ToolCallRequest>,
    usage: Option<Usage>,
    model: String,
}

/// Drives one conversation through backend calls and tool executions.
///
/// Each call to [`run`](Self::run) or [`run_stream`](Self::run_stream)
/// appends the user message, then alternates between the backend and the
/// tool registry until the backend answers without requesting tools.
pub struct OrchestrationLoop {
    backend: Arc<dyn Backend>,
    model: String,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    options: GenerationOptions,

    /// Maximum backend calls per turn
    max_iterations: u32,

    /// Ask the backend for a reasoning trace
    reasoning: bool,

    request_timeout: Option<Duration>,
}

impl OrchestrationLoop {
    pub fn new(
        backend: Arc<dyn Backend>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            tools,
            event_bus,
            options: GenerationOptions::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            reasoning: false,
            request_timeout: None,
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the maximum number of backend calls per turn (at least 1).
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Request a reasoning trace from the backend.
    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = enabled;
        self
    }

    /// Bound each backend call. When streaming, the bound applies to
    /// opening the stream and to each wait for the next fragment.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn with complete (non-streamed) backend replies.
    pub async fn run(
        &self,
        context: &mut ConversationContext,
        user_text: &str,
    ) -> Result<TurnOutput, Error> {
        self.run_turn(context, user_text, None).await
    }

    /// Run one turn with streamed backend replies, forwarding display
    /// events to `events` as fragments arrive.
    ///
    /// A closed `events` receiver does not stop the turn.
    pub async fn run_stream(
        &self,
        context: &mut ConversationContext,
        user_text: &str,
        events: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<TurnOutput, Error> {
        let result = self.run_turn(context, user_text, Some(events)).await;
        match &result {
            Ok(output) => {
                let _ = events
                    .send(AgentStreamEvent::Done {
                        conversation_id: context.id().to_string(),
                        usage: output.usage,
                        iterations: output.iterations,
                        tool_calls_made: output.tool_calls_made,
                    })
                    .await;
            }
            Err(e) => {
                let _ = events
                    .send(AgentStreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
        result
    }

    async fn run_turn(
        &self,
        context: &mut ConversationContext,
        user_text: &str,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<TurnOutput, Error> {
        context.append(Role::User, user_text)?;

        let conversation_id = context.id().to_string();
        info!(
            conversation_id = %conversation_id,
            messages = context.len(),
            streaming = events.is_some(),
            "Processing turn"
        );
        self.event_bus.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            content_preview: preview(user_text),
            timestamp: Utc::now(),
        });

        let descriptors = self.tools.describe_all();
        let mut reasoning_trace = String::new();
        let mut usage_total: Option<Usage> = None;
        let mut tool_calls_made = 0;

        for iteration in 1..=self.max_iterations {
            debug!(conversation_id = %conversation_id, iteration, "Requesting backend reply");

            let request = GenerationRequest {
                model: self.model.clone(),
                messages: context.snapshot(),
                tools: descriptors.clone(),
                options: self.options,
                stream: events.is_some(),
                reasoning: self.reasoning,
            };

            let reply = match events {
                Some(tx) => self.stream_reply(request, tx).await,
                None => self.generate_reply(request).await,
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(
                        conversation_id = %conversation_id,
                        iteration,
                        error = %e,
                        "Backend call failed"
                    );
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("backend call {iteration}"),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e.into());
                }
            };

            self.event_bus.publish(DomainEvent::BackendCalled {
                conversation_id: conversation_id.clone(),
                model: reply.model.clone(),
                iteration,
                tool_calls: reply.tool_calls.len(),
                tokens_used: reply.usage.map(|u| u.total_tokens),
                timestamp: Utc::now(),
            });
            if let Some(usage) = reply.usage {
                usage_total = Some(add_usage(usage_total, usage));
            }
            if let Some(trace) = &reply.reasoning {
                reasoning_trace.push_str(trace);
            }

            if reply.tool_calls.is_empty() {
                context.append_message(Message::assistant(reply.content.clone()))?;

                info!(
                    conversation_id = %conversation_id,
                    iterations = iteration,
                    tool_calls_made,
                    "Turn complete"
                );
                self.event_bus.publish(DomainEvent::TurnCompleted {
                    conversation_id,
                    iterations: iteration,
                    tool_calls_made,
                    timestamp: Utc::now(),
                });

                return Ok(TurnOutput {
                    content: reply.content,
                    reasoning: (self.reasoning && !reasoning_trace.is_empty())
                        .then_some(reasoning_trace),
                    iterations: iteration,
                    tool_calls_made,
                    usage: usage_total,
                });
            }

            debug!(tool_count = reply.tool_calls.len(), "Executing tool calls");

            let mut assistant = Message::assistant_tool_calls(reply.tool_calls.clone());
            assistant.content = reply.content;
            context.append_message(assistant)?;

            for call in reply.tool_calls {
                let result = self.execute_tool(call, events).await;
                context.append_message(result.into_message())?;
                tool_calls_made += 1;
            }
        }

        warn!(
            conversation_id = %conversation_id,
            max_iterations = self.max_iterations,
            "Max tool iterations reached without a final answer"
        );
        let err = Error::ToolLoopExceeded {
            max_iterations: self.max_iterations,
        };
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: "tool loop".into(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
        Err(err)
    }

    async fn generate_reply(&self, request: GenerationRequest) -> Result<Reply, BackendError> {
        let response = self.with_timeout(self.backend.generate(request)).await??;
        Ok(Reply {
            content: response.message.content,
            reasoning: response.reasoning,
            tool_calls: response.message.tool_calls,
            usage: response.usage,
            model: response.model,
        })
    }

    async fn stream_reply(
        &self,
        request: GenerationRequest,
        events: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<Reply, BackendError> {
        let mut rx = self.with_timeout(self.backend.stream(request)).await??;
        let mut decoder = StreamDecoder::new();

        while let Some(fragment) = self.with_timeout(rx.recv()).await? {
            for event in decoder.push(fragment?) {
                let _ = events.send(event.into()).await;
            }
            if decoder.is_done() {
                break;
            }
        }

        let turn = decoder.finish();
        Ok(Reply {
            content: turn.content,
            reasoning: turn.reasoning,
            tool_calls: turn.tool_calls,
            usage: turn.usage,
            model: self.model.clone(),
        })
    }

    /// Invoke one tool call. Failures become an error result, never an `Err`.
    async fn execute_tool(
        &self,
        call: ToolCallRequest,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> ToolResult {
        if let Some(tx) = events {
            let _ = tx
                .send(AgentStreamEvent::ToolCall {
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                })
                .await;
        }

        let start = Instant::now();
        let outcome = self.tools.invoke(&call.name, call.arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = &outcome {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
        }
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: outcome.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let result = ToolResult::new(call.name, outcome);
        if let Some(tx) = events {
            let _ = tx
                .send(AgentStreamEvent::ToolResult {
                    name: result.tool_name.clone(),
                    output: result.text(),
                    success: !result.is_error(),
                })
                .await;
        }
        result
    }

    async fn with_timeout<F: std::future::Future>(
        &self,
        fut: F,
    ) -> Result<F::Output, BackendError> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| BackendError::Timeout(limit.as_secs())),
            None => Ok(fut.await),
        }
    }
}

fn add_usage(total: Option<Usage>, usage: Usage) -> Usage {
    let total = total.unwrap_or_default();
    Usage {
        prompt_tokens: total.prompt_tokens + usage.prompt_tokens,
        completion_tokens: total.completion_tokens + usage.completion_tokens,
        total_tokens: total.total_tokens + usage.total_tokens,
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 80;
    match text.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
