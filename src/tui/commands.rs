//! Command-bar routing
//!
//! Turns trimmed command-bar input into an [`Action`] using a fixed alias
//! table. Pure and stateless: identical input always yields the identical
//! action, unknown verbs pass through to the external executor.

use crate::kube::ResourceKind;

/// What the command bar asked the application to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SwitchResource(ResourceKind),
    SwitchNamespace(String),
    SwitchContext(String),
    ListContexts,
    Quit,
    /// Unrecognized input, forwarded verbatim to the command executor
    PassThrough(String),
}

/// Routes one command. `input` is trimmed, non-empty text.
pub fn route(input: &str) -> Action {
    let (verb, arg) = match input.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb.to_lowercase(), rest.trim()),
        None => (input.to_lowercase(), ""),
    };

    match verb.as_str() {
        "po" | "pod" | "pods" => Action::SwitchResource(ResourceKind::Pods),
        "svc" | "service" | "services" => Action::SwitchResource(ResourceKind::Services),
        "deploy" | "deployment" | "deployments" => {
            Action::SwitchResource(ResourceKind::Deployments)
        }
        "no" | "node" | "nodes" => Action::SwitchResource(ResourceKind::Nodes),
        "ns" | "namespace" | "namespaces" => {
            if arg.is_empty() {
                Action::SwitchResource(ResourceKind::Namespaces)
            } else {
                Action::SwitchNamespace(arg.to_string())
            }
        }
        "ctx" | "context" => {
            if arg.is_empty() {
                Action::ListContexts
            } else {
                Action::SwitchContext(arg.to_string())
            }
        }
        "q" | "quit" => Action::Quit,
        _ => Action::PassThrough(input.to_string()),
    }
}
