//! kopilot: Kubernetes terminal dashboard with an AI copilot
//!
//! This library provides:
//! - A live resource dashboard (pods, services, deployments, namespaces,
//!   nodes) with filtering, a command bar, and periodic refresh
//! - A copilot that answers questions by running kubectl through a single
//!   permitted tool, streaming typed events back into the UI
//! - kubectl-backed resource listing and kubeconfig context switching

pub mod agent;
pub mod config;
pub mod exec;
pub mod kube;
pub mod tui;

pub use config::Config;
