//! `colloquy chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use colloquy_agent::{AgentStreamEvent, OrchestrationLoop, TurnOutput};
use colloquy_config::{AppConfig, load_system_prompt};
use colloquy_core::error::Error;
use colloquy_core::event::EventBus;
use colloquy_core::message::ConversationContext;
use colloquy_providers::{OllamaBackend, PullProgress};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub struct ChatArgs {
    pub message: Option<String>,
    pub stream: bool,
    pub think: bool,
}

pub async fn run(config: AppConfig, args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(colloquy_providers::build_from_config(&config));
    ensure_model(&backend, &config.model).await?;

    let tools = Arc::new(colloquy_tools::default_registry(&config)?);
    let event_bus = Arc::new(EventBus::default());
    spawn_event_logger(&event_bus);

    let mut context = match config.system_prompt_path.as_deref().and_then(load_system_prompt) {
        Some(prompt) => ConversationContext::with_system(prompt),
        None => ConversationContext::new(),
    };

    let agent = OrchestrationLoop::new(backend, &config.model, tools.clone(), event_bus)
        .with_options(config.options)
        .with_max_iterations(config.max_iterations)
        .with_reasoning(args.think)
        .with_request_timeout(config.request_timeout());

    if let Some(msg) = args.message {
        // Single message mode
        let mut out = std::io::stdout();
        take_turn(&agent, &mut context, &msg, args.stream, &mut out).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Model:  {}", config.model);
    println!("  Tools:  {}", tools.names().join(", "));
    println!("  Type {} or press Ctrl+C to quit.", config.exit_commands.join(" / "));
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else {
            // EOF
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if config.is_exit_command(input) {
            break;
        }

        let mut out = std::io::stdout();
        tokio::select! {
            result = take_turn(&agent, &mut context, input, args.stream, &mut out) => {
                if let Err(e) = result {
                    eprintln!("Error: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Run one turn and render it to `out`.
async fn take_turn<W: Write>(
    agent: &OrchestrationLoop,
    context: &mut ConversationContext,
    input: &str,
    stream: bool,
    out: &mut W,
) -> Result<TurnOutput, Error> {
    if !stream {
        let output = agent.run(context, input).await?;
        if let Some(reasoning) = &output.reasoning {
            let _ = writeln!(out, "<think>\n{}\n</think>", reasoning.trim());
        }
        let _ = writeln!(out, "{}", output.content);
        return Ok(output);
    }

    let (tx, mut rx) = mpsc::channel(64);
    let turn = async {
        let result = agent.run_stream(context, input, &tx).await;
        drop(tx);
        result
    };
    let render = async {
        let mut renderer = Renderer::new(out);
        while let Some(event) = rx.recv().await {
            renderer.render(&event);
        }
    };
    let (result, ()) = tokio::join!(turn, render);
    result
}

/// Writes stream events as terminal text.
///
/// Reasoning is wrapped in `<think>` / `</think>`; tool activity goes on
/// its own bracketed lines.
struct Renderer<W: Write> {
    out: W,
    in_reasoning: bool,
    at_line_start: bool,
}

impl<W: Write> Renderer<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            in_reasoning: false,
            at_line_start: true,
        }
    }

    fn render(&mut self, event: &AgentStreamEvent) {
        let _ = self.try_render(event);
    }

    fn try_render(&mut self, event: &AgentStreamEvent) -> std::io::Result<()> {
        match event {
            AgentStreamEvent::ReasoningStarted => {
                self.start_line()?;
                writeln!(self.out, "<think>")?;
                self.in_reasoning = true;
            }
            AgentStreamEvent::Reasoning { content } | AgentStreamEvent::Chunk { content } => {
                self.write_text(content)?;
            }
            AgentStreamEvent::ContentStarted => {
                self.close_reasoning()?;
            }
            AgentStreamEvent::ToolCall { name, input } => {
                self.close_reasoning()?;
                self.start_line()?;
                writeln!(self.out, "[tool] {name} {input}")?;
            }
            AgentStreamEvent::ToolResult { name, output, .. } => {
                self.start_line()?;
                writeln!(self.out, "[tool] {name} -> {output}")?;
            }
            AgentStreamEvent::Done { .. } => {
                self.close_reasoning()?;
                self.start_line()?;
            }
            AgentStreamEvent::Error { .. } => {
                // Reported by the caller
                self.close_reasoning()?;
                self.start_line()?;
            }
        }
        self.out.flush()
    }

    fn write_text(&mut self, text: &str) -> std::io::Result<()> {
        write!(self.out, "{text}")?;
        self.at_line_start = text.ends_with('\n');
        Ok(())
    }

    fn start_line(&mut self) -> std::io::Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            self.at_line_start = true;
        }
        Ok(())
    }

    fn close_reasoning(&mut self) -> std::io::Result<()> {
        if self.in_reasoning {
            self.start_line()?;
            writeln!(self.out, "</think>")?;
            self.in_reasoning = false;
        }
        Ok(())
    }
}

/// Pull the model if the backend does not have it yet.
async fn ensure_model(
    backend: &OllamaBackend,
    model: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let installed = backend.has_model(model).await.map_err(|e| {
        format!("Cannot reach the backend at {}: {e}", backend.base_url())
    })?;
    if installed {
        tracing::debug!(model, "Model already installed");
        return Ok(());
    }

    eprintln!("Model {model} not found locally, pulling it...");
    backend
        .pull_model(model, |progress| {
            eprint!("\r{}", progress_line(progress));
        })
        .await?;
    eprintln!();
    tracing::info!(model, "Model pulled");
    Ok(())
}

fn progress_line(progress: &PullProgress) -> String {
    match progress.percent() {
        Some(pct) => format!("  {} {pct:>3}%", progress.status),
        None => format!("  {:<40}", progress.status),
    }
}

/// Forward domain events to the tracing subscriber.
fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(event.as_ref()) {
                    Ok(json) => tracing::info!(target: "colloquy::events", event = %json),
                    Err(e) => tracing::warn!("Failed to serialize event: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
