//! Interpreter backed by an OpenAI-compatible Chat Completions endpoint.
//!
//! Works against api.openai.com as well as local servers exposing the same
//! API (Ollama serves it at `http://localhost:11434/v1`).

use async_trait::async_trait;
use mterm_core::command::builtin_commands;
use mterm_core::config::InterpreterConfig;
use mterm_core::error::{MtermError, Result};
use mterm_core::interpreter::{Interpreter, ResolvedCommand, SessionContext};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const COMMAND_INSTRUCTIONS: &str = r#"You convert natural-language requests into a single
terminal command.
Reply with JSON only, no prose and no code fences: {"command": "<command line>"}.
Prefer the builtin commands listed below. Use a plain shell command only when no builtin fits.
If the request cannot be expressed as one command, reply {"command": null}.

Examples:
- "create a new folder called test" -> {"command": "mkdir test"}
- "move file1.txt into the test folder" -> {"command": "mv file1.txt test/"}
- "what is the CPU usage?" -> {"command": "cpu"}
- "search for 'hello' in main.py" -> {"command": "grep hello main.py"}"#;

const CHAT_INSTRUCTIONS: &str = "You are a helpful assistant inside a command terminal. \
Answer briefly. When the user asks how to do something, suggest the terminal command.";

/// Interpreter that asks a chat model for the command.
#[derive(Clone)]
pub struct OpenAiInterpreter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiInterpreter {
    /// Creates an interpreter for `endpoint` (the API base, e.g. `https://api.openai.com/v1`).
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MtermError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// Builds an interpreter from config, or `None` when no endpoint is set.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`; local servers usually need none.
    pub fn from_config(config: &InterpreterConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return Ok(None);
        };
        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Self::new(
            endpoint,
            api_key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String> {
        let mut request = self
            .client
            .post(self.completions_url())
            .header("content-type", "application/json")
            .json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await.map_err(|err| {
            MtermError::interpretation(format!("interpreter request failed: {err}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            MtermError::interpretation(format!("Failed to parse interpreter response: {err}"))
        })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl Interpreter for OpenAiInterpreter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn interpret(&self, text: &str, context: &SessionContext) -> Result<ResolvedCommand> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(command_prompt(context)),
                ChatMessage::user(text.to_string()),
            ],
            temperature: Some(0.1),
        };

        let reply = self.send_request(&request).await?;
        let command = parse_command_reply(&reply)?;
        tracing::debug!("[OpenAiInterpreter] {:?} -> {:?}", text, command);
        Ok(ResolvedCommand::new(command).with_explanation(format!("suggested by {}", self.model)))
    }

    async fn converse(&self, text: &str, context: &SessionContext) -> Result<String> {
        let mut messages = vec![ChatMessage::system(format!(
            "{CHAT_INSTRUCTIONS}\nWorking directory: {}",
            context.working_directory.display()
        ))];
        for entry in &context.recent_history {
            messages.push(ChatMessage::user(entry.raw_input.clone()));
            messages.push(ChatMessage::assistant(entry.outcome.summary.clone()));
        }
        messages.push(ChatMessage::user(text.to_string()));

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: None,
        };
        self.send_request(&request).await
    }
}

fn command_prompt(context: &SessionContext) -> String {
    let mut prompt = String::from(COMMAND_INSTRUCTIONS);
    prompt.push_str("\n\nBuiltin commands:\n");
    for cmd in builtin_commands() {
        prompt.push_str(&format!("- {}: {}\n", cmd.usage, cmd.description));
    }
    prompt.push_str(&format!(
        "\nWorking directory: {}\n",
        context.working_directory.display()
    ));
    if !context.recent_history.is_empty() {
        prompt.push_str("Recent commands:\n");
        for entry in &context.recent_history {
            let command = entry.resolved_command.as_deref().unwrap_or(&entry.raw_input);
            prompt.push_str(&format!("- {} ({})\n", command, entry.outcome.status));
        }
    }
    prompt
}

#[derive(Deserialize)]
struct CommandReply {
    command: Option<String>,
    #[serde(default)]
    commands: Vec<String>,
}

/// Accepts `{"command": "..."}`, optionally wrapped in a code fence.
fn parse_command_reply(reply: &str) -> Result<String> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let parsed: CommandReply = serde_json::from_str(body).map_err(|_| {
        MtermError::interpretation(format!("expected a JSON command, got: {}", first_line(reply)))
    })?;

    let command = match (parsed.command, parsed.commands.as_slice()) {
        (Some(command), _) => command,
        (None, [single]) => single.clone(),
        (None, []) => return Err(MtermError::interpretation("no command suggested")),
        (None, _) => {
            return Err(MtermError::interpretation(
                "multi-step requests are not supported; ask for one step at a time",
            ));
        }
    };

    let command = command.trim();
    if command.is_empty() || command.contains('\n') {
        return Err(MtermError::interpretation("no usable command suggested"));
    }
    Ok(command.to_string())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn system(content: String) -> Self {
        Self {
            role: "system",
            content,
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user",
            content,
        }
    }

    fn assistant(content: String) -> Self {
        Self {
            role: "assistant",
            content,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| MtermError::interpretation("interpreter returned no content"))
}

fn map_http_error(status: StatusCode, body: String) -> MtermError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    MtermError::interpretation(format!("interpreter returned {}: {}", status.as_u16(), message))
}
