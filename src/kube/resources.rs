//! Resource kinds and the listing seam
//!
//! The dashboard only filters and dispatches table data; cell semantics stay
//! opaque to it except for column 0, which is always the resource name.

use async_trait::async_trait;

/// The closed set of resource kinds the dashboard can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pods,
    Services,
    Deployments,
    Namespaces,
    Nodes,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Pods,
        ResourceKind::Services,
        ResourceKind::Deployments,
        ResourceKind::Namespaces,
        ResourceKind::Nodes,
    ];

    /// Display title for the panel header.
    pub fn title(&self) -> &'static str {
        match self {
            ResourceKind::Pods => "Pods",
            ResourceKind::Services => "Services",
            ResourceKind::Deployments => "Deployments",
            ResourceKind::Namespaces => "Namespaces",
            ResourceKind::Nodes => "Nodes",
        }
    }

    /// Singular name used in kubectl invocations and prompts.
    pub fn kubectl_name(&self) -> &'static str {
        match self {
            ResourceKind::Pods => "pod",
            ResourceKind::Services => "service",
            ResourceKind::Deployments => "deployment",
            ResourceKind::Namespaces => "namespace",
            ResourceKind::Nodes => "node",
        }
    }

    /// Whether listings are scoped to a namespace.
    pub fn namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespaces | ResourceKind::Nodes)
    }
}

/// Tabular listing for one resource kind: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResourceTable {
    pub fn new(headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    /// Connectivity and listing failures surface as this single-row table
    /// rather than as errors.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            headers: vec!["ERROR".to_string()],
            rows: vec![vec![message.into()]],
        }
    }
}

/// Lists resources for the dashboard. Never fails past this boundary.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> ResourceTable;
}

/// One entry from the context registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub name: String,
    pub is_active: bool,
}

/// Kubeconfig context enumeration and switching.
#[async_trait]
pub trait ContextRegistry: Send + Sync {
    async fn list_contexts(&self) -> Vec<ContextEntry>;
    async fn switch_context(&self, name: &str) -> bool;
}
