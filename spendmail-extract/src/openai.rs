//! OpenAI-compatible chat-completions backend.
//!
//! Sends one `POST {base_url}/v1/chat/completions` per email with the
//! transaction function offered as a tool. Transport failures, timeouts and
//! non-2xx answers surface as `ServiceUnavailable`; nothing is retried.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spendmail_core::ExtractError;
use tokio::runtime::RuntimeFlavor;
use tracing::debug;

use crate::classifier::{ChatBackend, ChatRequest, ChatResponse, FunctionCall};

const PROVIDER: &str = "openai";

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

pub struct OpenAiBackend {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, ExtractError> {
        // Calls may each run on a fresh runtime; idle connections must not
        // outlive the runtime that opened them.
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn complete_async(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError> {
        let body = request_body(&self.config.model, request);
        debug!(model = %self.config.model, chars = request.user.chars().count(), "Calling classifier");

        let resp = self
            .client
            .post(self.endpoint())
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    unavailable(format!("request timed out after {:?}", self.config.timeout))
                } else {
                    unavailable(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("{status} {}", txt.trim())));
        }

        let txt = resp
            .text()
            .await
            .map_err(|e| unavailable(format!("failed to read response: {e}")))?;
        parse_response(&txt)
    }

    fn complete_on_own_runtime(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| unavailable(format!("failed to start runtime: {e}")))?;
        rt.block_on(self.complete_async(request))
    }
}

impl ChatBackend for OpenAiBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError> {
        // Callers may already be inside a tokio runtime, where a nested
        // block_on would panic. block_in_place only works on the
        // multi-threaded scheduler; a current-thread runtime gets a helper
        // thread with its own runtime instead.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.complete_async(request)))
            }
            Ok(_) => std::thread::scope(|s| {
                s.spawn(|| self.complete_on_own_runtime(request))
                    .join()
                    .unwrap_or_else(|_| Err(unavailable("classifier thread panicked".to_string())))
            }),
            Err(_) => self.complete_on_own_runtime(request),
        }
    }
}

fn unavailable(reason: String) -> ExtractError {
    ExtractError::ServiceUnavailable {
        provider: PROVIDER.to_string(),
        reason,
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Tool<'a> {
    #[serde(rename = "type")]
    t: &'a str,
    function: &'a Value,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Msg<'a>>,
    tools: Vec<Tool<'a>>,
    tool_choice: &'a str,
}

fn request_body<'a>(model: &'a str, request: &'a ChatRequest) -> Req<'a> {
    Req {
        model,
        temperature: request.temperature,
        messages: vec![
            Msg {
                role: "system",
                content: &request.system,
            },
            Msg {
                role: "user",
                content: &request.user,
            },
        ],
        tools: vec![Tool {
            t: "function",
            function: &request.function,
        }],
        tool_choice: "auto",
    }
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
    /// Legacy `functions` API.
    #[serde(default)]
    function_call: Option<FnCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FnCall,
}

#[derive(Deserialize)]
struct FnCall {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Interpret a chat-completions response body.
pub fn parse_response(body: &str) -> Result<ChatResponse, ExtractError> {
    let out: Resp = serde_json::from_str(body)
        .map_err(|e| unavailable(format!("unreadable response body: {e}")))?;
    let Some(choice) = out.choices.into_iter().next() else {
        return Err(unavailable("response contained no choices".to_string()));
    };

    let message = choice.message;
    let call = message
        .tool_calls
        .and_then(|calls| calls.into_iter().next().map(|c| c.function))
        .or(message.function_call)
        .map(|f| {
            // Arguments arrive as a JSON-encoded string.
            let arguments = match f.arguments {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s),
                Some(other) => {
                    return Err(ExtractError::protocol(format!(
                        "function arguments must be a JSON string, got {}",
                        json_kind(&other)
                    )));
                }
            };
            Ok(FunctionCall {
                name: f.name,
                arguments,
            })
        })
        .transpose()?;

    Ok(ChatResponse {
        function_call: call,
        text: message.content,
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
