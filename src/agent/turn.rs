//! Drives a single copilot turn
//!
//! `TurnEngine` sends one prompt to the transport, normalizes the resulting
//! message stream into [`AgentEvent`]s, and pushes them into the caller's
//! sink. One engine lives for the whole session; its cluster configuration
//! can change between turns but is snapshotted at the start of each run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures::StreamExt;
use tokio::sync::mpsc;

use super::events::AgentEvent;
use super::transport::{classify, Transport, TurnOptions};

/// The one tool the transport is permitted to invoke.
pub const KUBECTL_TOOL: &str = "kubectl_exec";

/// Upper bound on request/response rounds within one turn.
const MAX_TURNS: usize = 30;

/// Cluster/model configuration the system directive embeds.
#[derive(Debug, Clone, Default)]
pub struct TurnConfig {
    pub cluster_name: String,
    pub context_name: String,
    pub namespace: String,
    pub model: Option<String>,
}

/// Runs one cancellable turn against the transport.
pub struct TurnEngine {
    transport: Arc<dyn Transport>,
    config: RwLock<TurnConfig>,
    cancelled: AtomicBool,
}

impl TurnEngine {
    pub fn new(transport: Arc<dyn Transport>, config: TurnConfig) -> Self {
        Self {
            transport,
            config: RwLock::new(config),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Updates the namespace used by subsequent turns.
    pub fn set_namespace(&self, namespace: &str) {
        if let Ok(mut config) = self.config.write() {
            config.namespace = namespace.to_string();
        }
    }

    /// Updates the cluster/context pair used by subsequent turns.
    pub fn set_cluster(&self, cluster_name: &str, context_name: &str) {
        if let Ok(mut config) = self.config.write() {
            config.cluster_name = cluster_name.to_string();
            config.context_name = context_name.to_string();
        }
    }

    /// Requests cooperative cancellation of the in-flight turn.
    ///
    /// Idempotent; takes effect at the next message boundary. Has no effect
    /// on a turn that has already completed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Runs the turn for `prompt`, pushing events into `sink`.
    ///
    /// Exactly one [`AgentEvent::Done`] is sent as the final event on every
    /// path: stream exhaustion, transport error, or cancellation. Transport
    /// errors are reported as one `Error` event and are not fatal to the
    /// engine.
    pub async fn run(&self, prompt: &str, sink: &mpsc::UnboundedSender<AgentEvent>) {
        self.cancelled.store(false, Ordering::SeqCst);
        let options = self.options();
        tracing::info!(prompt_len = prompt.len(), "starting copilot turn");

        match self.transport.stream(prompt, &options).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    if self.cancelled.load(Ordering::SeqCst) {
                        tracing::info!("turn cancelled at message boundary");
                        break;
                    }
                    match item {
                        Ok(msg) => {
                            for event in classify(&msg) {
                                let _ = sink.send(event);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "transport stream failed");
                            let _ = sink.send(AgentEvent::Error {
                                body: err.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "transport refused to open a stream");
                let _ = sink.send(AgentEvent::Error {
                    body: err.to_string(),
                });
            }
        }

        let _ = sink.send(AgentEvent::Done);
    }

    fn options(&self) -> TurnOptions {
        let config = self
            .config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default();
        TurnOptions {
            system_prompt: system_prompt(&config),
            allowed_tools: vec![KUBECTL_TOOL.to_string()],
            max_turns: MAX_TURNS,
            model: config.model,
        }
    }
}

fn system_prompt(config: &TurnConfig) -> String {
    format!(
        "You are a Kubernetes cluster assistant embedded in a terminal UI (similar to k9s).\n\
         You have access to the {tool} tool to run kubectl commands against the cluster.\n\
         \n\
         Current cluster context:\n\
         - Cluster: {cluster}\n\
         - Context: {context}\n\
         - Default namespace: {namespace}\n\
         \n\
         Guidelines:\n\
         - Use kubectl commands to query real cluster data -- do not guess.\n\
         - Be concise -- your output is displayed in a narrow terminal panel.\n\
         - Format output for readability in a monospace terminal.\n\
         - When listing resources, prefer tabular kubectl output.\n\
         - If a command fails, explain the error clearly.\n\
         - You can chain multiple kubectl calls to gather information before answering.",
        tool = KUBECTL_TOOL,
        cluster = config.cluster_name,
        context = config.context_name,
        namespace = config.namespace,
    )
}
