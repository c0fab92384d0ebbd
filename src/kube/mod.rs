//! Cluster access: resource listings and kubeconfig contexts

pub mod kubectl;
pub mod resources;

pub use kubectl::{ClusterInfo, KubectlClient};
pub use resources::{ContextEntry, ContextRegistry, ResourceBackend, ResourceKind, ResourceTable};
