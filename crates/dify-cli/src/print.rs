use std::io::Write as _;

use dify_client::errors::HandlerError;
use dify_client::stream::{MessageEndEvent, MessageEvent, StreamHandler, TtsEvent, WorkflowEvent};

/// Writes answer text to stdout as it arrives and workflow progress to stderr.
#[derive(Default)]
pub struct PrintHandler {
    pub task_id: Option<String>,
    pub audio: Vec<u8>,
    verbose: bool,
}

impl PrintHandler {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    fn remember_task(&mut self, task_id: &str) {
        if self.task_id.is_none() && !task_id.is_empty() {
            self.task_id = Some(task_id.to_string());
        }
    }
}

impl StreamHandler for PrintHandler {
    fn on_message(&mut self, event: &MessageEvent) -> Result<(), HandlerError> {
        self.remember_task(&event.envelope.task_id);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(event.answer.as_bytes()).map_err(HandlerError::new)?;
        stdout.flush().map_err(HandlerError::new)
    }

    fn on_message_workflow(&mut self, event: &WorkflowEvent) -> Result<(), HandlerError> {
        self.remember_task(&event.envelope.task_id);
        if event.envelope.event == "workflow_finished"
            && let Some(outputs) = &event.data.outputs
        {
            println!("{}", serde_json::to_string_pretty(outputs).map_err(HandlerError::new)?);
        }
        if self.verbose {
            let node = event
                .data
                .title
                .as_deref()
                .or(event.data.node_id.as_deref())
                .unwrap_or("-");
            let status = event.data.status.as_deref().unwrap_or("");
            eprintln!("[{}] {node} {status}", event.envelope.event);
        }
        Ok(())
    }

    fn on_message_end(&mut self, event: &MessageEndEvent) -> Result<(), HandlerError> {
        self.remember_task(&event.envelope.task_id);
        println!();
        if self.verbose {
            let usage = &event.metadata.usage;
            eprintln!(
                "conversation={} tokens={} (prompt {}, completion {})",
                event.envelope.conversation_id.as_deref().unwrap_or("-"),
                usage.total_tokens,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        Ok(())
    }

    fn on_tts(&mut self, event: &TtsEvent) -> Result<(), HandlerError> {
        self.remember_task(&event.envelope.task_id);
        let bytes = event.audio_bytes().map_err(HandlerError::new)?;
        self.audio.extend_from_slice(&bytes);
        Ok(())
    }
}
