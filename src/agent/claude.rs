//! Anthropic Messages API transport
//!
//! SECURITY: the API key is ONLY sent to the official Anthropic endpoint,
//! never to any third-party service.
//!
//! The transport owns the agentic loop for one turn: it sends the prompt,
//! yields each assistant message, executes any requested `kubectl_exec`
//! invocations through the command executor, feeds the results back as a
//! user message (also yielded), and repeats until the model stops asking for
//! tools or the turn budget runs out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::exec::{CommandExecutor, DEFAULT_TIMEOUT};

use super::transport::{ContentBlock, Transport, TransportMessage, TurnOptions};
use super::turn::KUBECTL_TOOL;

/// Official Anthropic API endpoint - API key is ONLY sent here
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Cap on tool output fed back to the model and into the transcript.
const MAX_TOOL_OUTPUT: usize = 8000;

pub struct ClaudeTransport {
    client: reqwest::Client,
    api_key: String,
    default_model: String,
    max_tokens: usize,
    executor: CommandExecutor,
}

impl ClaudeTransport {
    pub fn new(api_key: String, default_model: String, executor: CommandExecutor) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            default_model,
            max_tokens: 4096,
            executor,
        }
    }

    async fn send_request(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({}): {}", status, error_text);
        }

        response
            .json::<ApiResponse>()
            .await
            .context("Failed to parse Anthropic API response")
    }

    /// Runs the agentic loop, pushing transport messages into `tx`.
    async fn drive_turn(
        &self,
        prompt: String,
        options: TurnOptions,
        tx: mpsc::UnboundedSender<Result<TransportMessage>>,
    ) {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let mut messages = vec![ApiMessage {
            role: "user".to_string(),
            content: vec![ApiBlock::Text { text: prompt }],
        }];

        for round in 0..options.max_turns {
            let request = ApiRequest {
                model: model.clone(),
                max_tokens: self.max_tokens,
                system: options.system_prompt.clone(),
                messages: messages.clone(),
                tools: kubectl_tool_definitions(&options.allowed_tools),
            };

            let response = match self.send_request(&request).await {
                Ok(response) => response,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            tracing::debug!(round, stop_reason = ?response.stop_reason, "assistant message");

            let _ = tx.send(Ok(TransportMessage::Assistant {
                content: to_content_blocks(&response.content),
            }));

            let wants_tools = response.stop_reason.as_deref() == Some("tool_use");
            let tool_uses: Vec<_> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ApiBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if !wants_tools || tool_uses.is_empty() {
                let _ = tx.send(Ok(TransportMessage::Result {
                    is_error: false,
                    summary: None,
                }));
                return;
            }

            // Unrecognized block kinds cannot be echoed back on the next
            // request; the API would reject them.
            messages.push(ApiMessage {
                role: "assistant".to_string(),
                content: response
                    .content
                    .into_iter()
                    .filter(|block| !matches!(block, ApiBlock::Unknown))
                    .collect(),
            });

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                results.push(self.run_tool(&options, id, &name, &input).await);
            }
            let _ = tx.send(Ok(TransportMessage::User {
                content: to_content_blocks(&results),
            }));
            messages.push(ApiMessage {
                role: "user".to_string(),
                content: results,
            });
        }

        let _ = tx.send(Ok(TransportMessage::Result {
            is_error: true,
            summary: Some(format!(
                "Turn budget of {} rounds exhausted before the model finished",
                options.max_turns
            )),
        }));
    }

    async fn run_tool(
        &self,
        options: &TurnOptions,
        tool_use_id: String,
        name: &str,
        input: &Value,
    ) -> ApiBlock {
        if !options.allowed_tools.iter().any(|tool| tool == name) {
            return ApiBlock::ToolResult {
                tool_use_id,
                content: format!("tool '{}' is not permitted", name),
                is_error: true,
            };
        }
        let Some(command) = input.get("command").and_then(Value::as_str) else {
            return ApiBlock::ToolResult {
                tool_use_id,
                content: "missing required 'command' argument".to_string(),
                is_error: true,
            };
        };

        let mut argv = vec!["kubectl".to_string()];
        argv.extend(command.split_whitespace().map(str::to_string));
        let result = self.executor.execute(&argv, DEFAULT_TIMEOUT).await;
        ApiBlock::ToolResult {
            tool_use_id,
            content: truncate_chars(&result.output, MAX_TOOL_OUTPUT),
            is_error: result.failed,
        }
    }
}

#[async_trait]
impl Transport for ClaudeTransport {
    async fn stream(
        &self,
        prompt: &str,
        options: &TurnOptions,
    ) -> Result<BoxStream<'static, Result<TransportMessage>>> {
        if self.api_key.is_empty() {
            anyhow::bail!("ANTHROPIC_API_KEY not set -- the copilot requires it");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.clone_for_task();
        let prompt = prompt.to_string();
        let options = options.clone();
        tokio::spawn(async move {
            transport.drive_turn(prompt, options, tx).await;
        });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

impl ClaudeTransport {
    fn clone_for_task(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            default_model: self.default_model.clone(),
            max_tokens: self.max_tokens,
            executor: self.executor.clone(),
        }
    }
}

fn kubectl_tool_definitions(allowed_tools: &[String]) -> Vec<ApiTool> {
    allowed_tools
        .iter()
        .filter(|name| name.as_str() == KUBECTL_TOOL)
        .map(|name| ApiTool {
            name: name.clone(),
            description: "Run a kubectl command against the current cluster. \
                          Pass the arguments only, without the leading 'kubectl'."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "kubectl arguments, e.g. 'get pods -n default'"
                    }
                },
                "required": ["command"]
            }),
        })
        .collect()
}

fn to_content_blocks(blocks: &[ApiBlock]) -> Vec<ContentBlock> {
    blocks.iter().filter_map(api_block_to_content).collect()
}

fn api_block_to_content(block: &ApiBlock) -> Option<ContentBlock> {
    match block {
        ApiBlock::Text { text } => Some(ContentBlock::Text { text: text.clone() }),
        ApiBlock::Thinking { thinking, .. } => Some(ContentBlock::Thinking {
            thinking: thinking.clone(),
        }),
        ApiBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        }),
        ApiBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(ContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        }),
        ApiBlock::Unknown => None,
    }
}

/// Truncates at a character boundary, marking elided output.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}\n... (output truncated)", truncated)
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    system: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiBlock>,
    stop_reason: Option<String>,
}
