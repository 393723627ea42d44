//! `dify`: command-line access to a Dify app.
//!
//! Reads `DIFY_API_KEY`, `DIFY_BASE_URL` and `DIFY_TIMEOUT_SECS` from the
//! environment or a `.env` file.

mod env;
mod print;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dify_client::observability::init_observability;
use dify_client::prelude::*;
use dify_client::types::Inputs;
use dify_client::{FeedbackRequest, Rating, TtsRequest};

use crate::print::PrintHandler;

#[derive(Parser)]
#[command(name = "dify", about = "Talk to a Dify app from the terminal.")]
struct Cli {
    /// End-user identifier sent with every request.
    #[arg(long, global = true, default_value = "dify-cli")]
    user: String,

    /// Print workflow progress and token usage to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// App API key; overrides `DIFY_API_KEY`.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// API base URL; overrides `DIFY_BASE_URL`.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Dotenv file to load instead of the nearest `.env`.
    #[arg(long, global = true, value_name = "FILE")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a chat message and stream the answer.
    Chat {
        query: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,
        /// App input as KEY=VALUE; VALUE is parsed as JSON when possible.
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        /// Attach an uploaded image by its upload id.
        #[arg(long = "image-id", value_name = "ID")]
        image_ids: Vec<String>,
        /// Wait for the full answer instead of streaming.
        #[arg(long)]
        blocking: bool,
        /// Write streamed speech to this file.
        #[arg(long, value_name = "FILE")]
        audio_out: Option<PathBuf>,
    },
    /// Run a text-generation app and stream the answer.
    Complete {
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        #[arg(long)]
        blocking: bool,
        #[arg(long, value_name = "FILE")]
        audio_out: Option<PathBuf>,
    },
    /// Run a workflow and print its outputs.
    Workflow {
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        #[arg(long)]
        blocking: bool,
    },
    /// Show app name, description and tags.
    Info,
    /// Show app parameters as JSON.
    Parameters,
    /// Upload a file and print its upload id.
    Upload { path: PathBuf },
    /// Rate a message.
    Feedback {
        message_id: String,
        #[arg(long, value_enum)]
        rating: FeedbackRating,
        #[arg(long)]
        content: Option<String>,
    },
    /// Stop a running generation by task id.
    Stop {
        task_id: String,
        #[arg(long, value_enum, default_value = "chat")]
        endpoint: EndpointArg,
    },
    /// Synthesize speech for a text or an earlier message.
    Tts {
        #[arg(long, conflicts_with = "message_id")]
        text: Option<String>,
        #[arg(long)]
        message_id: Option<String>,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Delete a conversation.
    DeleteConversation { conversation_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum FeedbackRating {
    Like,
    Dislike,
    /// Revoke earlier feedback.
    None,
}

#[derive(Clone, Copy, ValueEnum)]
enum EndpointArg {
    Chat,
    Completion,
    Workflow,
}

impl From<EndpointArg> for Endpoint {
    fn from(value: EndpointArg) -> Self {
        match value {
            EndpointArg::Chat => Endpoint::Chat,
            EndpointArg::Completion => Endpoint::Completion,
            EndpointArg::Workflow => Endpoint::Workflow,
        }
    }
}

fn parse_inputs(pairs: &[String]) -> Result<Inputs, DifyError> {
    let mut inputs = Inputs::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(DifyError::Validation(format!(
                "input {pair:?} is not KEY=VALUE"
            )));
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        inputs.insert(key.trim().to_string(), value);
    }
    Ok(inputs)
}

/// Returns a signal that fires on Ctrl-C, plus the task watching for it.
fn abort_on_ctrl_c() -> (AbortSignal, tokio::task::JoinHandle<()>) {
    let (handle, signal) = AbortHandle::new();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });
    (signal, watcher)
}

/// After a cancelled stream, asks the server to stop the task as well.
async fn stop_if_cancelled(
    client: &DifyClient,
    endpoint: Endpoint,
    user: &str,
    end: StreamEnd,
    task_id: Option<&str>,
) -> Result<(), DifyError> {
    if end == StreamEnd::Completed {
        return Ok(());
    }
    eprintln!("\ncancelled");
    if let Some(task_id) = task_id {
        client.stop_response(endpoint, task_id, user).await?;
        tracing::info!(event = "dify.cli.task_stopped", task_id, "requested server-side stop");
    }
    Ok(())
}

async fn write_audio(path: Option<PathBuf>, audio: &[u8]) -> Result<(), DifyError> {
    let Some(path) = path else {
        return Ok(());
    };
    if audio.is_empty() {
        eprintln!("no speech was streamed");
        return Ok(());
    }
    tokio::fs::write(&path, audio)
        .await
        .map_err(|e| DifyError::Io(format!("failed to write {}: {e}", path.display())))?;
    eprintln!("wrote {} bytes of audio to {}", audio.len(), path.display());
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), DifyError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| DifyError::Decode(format!("failed to render JSON: {e}")))?;
    println!("{text}");
    Ok(())
}

fn build_client(api_key: Option<String>, base_url: Option<String>) -> Result<DifyClient, DifyError> {
    let mut config = match api_key {
        Some(key) => ClientConfig::from_env_with_key(key)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(url) = base_url {
        config = config.base_url(url);
    }
    DifyClient::new(config)
}

async fn run(cli: Cli) -> Result<(), DifyError> {
    let client = build_client(cli.api_key, cli.base_url)?;
    let user = cli.user.as_str();
    let mut handler = PrintHandler::new(cli.verbose);

    match cli.command {
        Command::Chat {
            query,
            conversation,
            inputs,
            image_ids,
            blocking,
            audio_out,
        } => {
            let mut request = ChatRequest::new(query).user(user);
            request.inputs = parse_inputs(&inputs)?;
            request.conversation_id = conversation;
            for id in image_ids {
                request = request.file(FileInput::uploaded(FileKind::Image, id));
            }
            if blocking {
                let response = client.chat(&request).await?;
                println!("{}", response.answer);
                eprintln!("conversation={}", response.conversation_id);
                return Ok(());
            }
            let (signal, watcher) = abort_on_ctrl_c();
            let end = client
                .chat_stream_with_abort(&request, &mut handler, signal)
                .await;
            watcher.abort();
            stop_if_cancelled(&client, Endpoint::Chat, user, end?, handler.task_id.as_deref())
                .await?;
            write_audio(audio_out, &handler.audio).await
        }
        Command::Complete {
            inputs,
            blocking,
            audio_out,
        } => {
            let mut request = CompletionRequest::new().user(user);
            request.inputs = parse_inputs(&inputs)?;
            if blocking {
                println!("{}", client.completion(&request).await?.answer);
                return Ok(());
            }
            let (signal, watcher) = abort_on_ctrl_c();
            let end = client
                .completion_stream_with_abort(&request, &mut handler, signal)
                .await;
            watcher.abort();
            stop_if_cancelled(
                &client,
                Endpoint::Completion,
                user,
                end?,
                handler.task_id.as_deref(),
            )
            .await?;
            println!();
            write_audio(audio_out, &handler.audio).await
        }
        Command::Workflow { inputs, blocking } => {
            let mut request = WorkflowRequest::new().user(user);
            request.inputs = parse_inputs(&inputs)?;
            if blocking {
                return print_json(&client.workflow_run(&request).await?.data);
            }
            let (signal, watcher) = abort_on_ctrl_c();
            let end = client
                .workflow_run_stream_with_abort(&request, &mut handler, signal)
                .await;
            watcher.abort();
            stop_if_cancelled(
                &client,
                Endpoint::Workflow,
                user,
                end?,
                handler.task_id.as_deref(),
            )
            .await
        }
        Command::Info => {
            let info = client.app_info().await?;
            println!("{}", info.name);
            if !info.description.is_empty() {
                println!("{}", info.description);
            }
            if !info.tags.is_empty() {
                println!("tags: {}", info.tags.join(", "));
            }
            Ok(())
        }
        Command::Parameters => print_json(&client.app_parameters().await?),
        Command::Upload { path } => {
            let uploaded = client.upload_file(&path, user).await?;
            println!("{}", uploaded.id);
            Ok(())
        }
        Command::Feedback {
            message_id,
            rating,
            content,
        } => {
            let rating = match rating {
                FeedbackRating::Like => Some(Rating::Like),
                FeedbackRating::Dislike => Some(Rating::Dislike),
                FeedbackRating::None => None,
            };
            let mut feedback = FeedbackRequest::new(rating, user);
            if let Some(content) = content {
                feedback = feedback.content(content);
            }
            client.send_feedback(&message_id, &feedback).await
        }
        Command::Stop { task_id, endpoint } => {
            client.stop_response(endpoint.into(), &task_id, user).await
        }
        Command::Tts {
            text,
            message_id,
            out,
        } => {
            let request = match (text, message_id) {
                (Some(text), _) => TtsRequest::for_text(text, user),
                (None, Some(id)) => TtsRequest::for_message(id, user),
                (None, None) => {
                    return Err(DifyError::Validation(
                        "tts needs --text or --message-id".into(),
                    ));
                }
            };
            let audio = client.text_to_audio(&request).await?;
            write_audio(Some(out), &audio).await
        }
        Command::DeleteConversation { conversation_id } => {
            client.delete_conversation(&conversation_id, user).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = env::load_dotenv(cli.env_file.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
    init_observability();

    if let Err(err) = run(cli).await {
        tracing::error!(event = "dify.cli.failed", error = %err);
        eprintln!("error: {err}");
        if let Some(api) = err.api_error() {
            eprintln!("code: {}", api.code);
        }
        std::process::exit(1);
    }
}
