//! kubectl-backed resource listing and context registry
//!
//! Everything goes through `kubectl ... -o json` so the dashboard works
//! against any cluster the operator's kubeconfig can reach. Failures of any
//! shape (kubectl missing, no cluster, bad JSON) become a one-row ERROR
//! table, never an error value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::exec::{CommandExecutor, DEFAULT_TIMEOUT};

use super::resources::{ContextEntry, ContextRegistry, ResourceBackend, ResourceKind, ResourceTable};

/// Startup connection info read from the kubeconfig.
#[derive(Debug, Clone, Default)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub context_name: String,
    /// Default namespace declared by the active context, if any
    pub namespace: Option<String>,
}

/// Shells out to kubectl for listings, contexts, and connection info.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    executor: CommandExecutor,
    kubeconfig: Option<String>,
}

impl KubectlClient {
    pub fn new(executor: CommandExecutor, kubeconfig: Option<String>) -> Self {
        Self {
            executor,
            kubeconfig,
        }
    }

    fn base_argv(&self) -> Vec<String> {
        let mut argv = vec!["kubectl".to_string()];
        if let Some(path) = &self.kubeconfig {
            argv.push("--kubeconfig".to_string());
            argv.push(path.clone());
        }
        argv
    }

    async fn kubectl_json(&self, args: &[&str]) -> Result<Value, String> {
        let mut argv = self.base_argv();
        argv.extend(args.iter().map(|a| a.to_string()));
        let result = self.executor.execute(&argv, DEFAULT_TIMEOUT).await;
        if result.failed {
            return Err(result.output);
        }
        serde_json::from_str(&result.output).map_err(|err| format!("bad kubectl output: {}", err))
    }

    /// Reads the active context's cluster/namespace from the kubeconfig.
    pub async fn connection_info(&self) -> ClusterInfo {
        let Ok(view) = self.kubectl_json(&["config", "view", "-o", "json"]).await else {
            return ClusterInfo::default();
        };
        let current = view
            .get("current-context")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut info = ClusterInfo {
            context_name: current.clone(),
            ..ClusterInfo::default()
        };
        for ctx in view
            .get("contexts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if ctx.get("name").and_then(Value::as_str) == Some(current.as_str()) {
                info.cluster_name = str_at(ctx, "/context/cluster");
                let ns = str_at(ctx, "/context/namespace");
                if !ns.is_empty() {
                    info.namespace = Some(ns);
                }
            }
        }
        info
    }
}

#[async_trait]
impl ResourceBackend for KubectlClient {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> ResourceTable {
        let mut args = vec!["get", kind.kubectl_name(), "-o", "json"];
        if kind.namespaced() {
            args.push("-n");
            args.push(namespace);
        }
        match self.kubectl_json(&args).await {
            Ok(json) => build_table(kind, &json),
            Err(message) => {
                tracing::warn!(kind = kind.title(), %message, "resource listing failed");
                ResourceTable::error(message)
            }
        }
    }
}

#[async_trait]
impl ContextRegistry for KubectlClient {
    async fn list_contexts(&self) -> Vec<ContextEntry> {
        let Ok(view) = self.kubectl_json(&["config", "view", "-o", "json"]).await else {
            return Vec::new();
        };
        let current = view
            .get("current-context")
            .and_then(Value::as_str)
            .unwrap_or_default();
        view.get("contexts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|ctx| ctx.get("name").and_then(Value::as_str))
            .map(|name| ContextEntry {
                name: name.to_string(),
                is_active: name == current,
            })
            .collect()
    }

    async fn switch_context(&self, name: &str) -> bool {
        let mut argv = self.base_argv();
        argv.extend(
            ["config", "use-context", name]
                .iter()
                .map(|a| a.to_string()),
        );
        let result = self.executor.execute(&argv, DEFAULT_TIMEOUT).await;
        if result.failed {
            tracing::warn!(context = name, output = %result.output, "context switch failed");
        }
        !result.failed
    }
}

/// Builds the display table for one `kubectl get -o json` payload.
pub fn build_table(kind: ResourceKind, json: &Value) -> ResourceTable {
    let Some(items) = json.get("items").and_then(Value::as_array) else {
        return ResourceTable::error("kubectl returned no item list");
    };
    match kind {
        ResourceKind::Pods => ResourceTable::new(
            &["NAME", "READY", "STATUS", "RESTARTS", "AGE"],
            items.iter().map(pod_row).collect(),
        ),
        ResourceKind::Services => ResourceTable::new(
            &["NAME", "TYPE", "CLUSTER-IP", "PORTS", "AGE"],
            items.iter().map(service_row).collect(),
        ),
        ResourceKind::Deployments => ResourceTable::new(
            &["NAME", "READY", "UP-TO-DATE", "AVAILABLE", "AGE"],
            items.iter().map(deployment_row).collect(),
        ),
        ResourceKind::Namespaces => ResourceTable::new(
            &["NAME", "STATUS", "AGE"],
            items.iter().map(namespace_row).collect(),
        ),
        ResourceKind::Nodes => ResourceTable::new(
            &["NAME", "STATUS", "ROLES", "AGE", "VERSION"],
            items.iter().map(node_row).collect(),
        ),
    }
}

fn pod_row(item: &Value) -> Vec<String> {
    let statuses = item
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let ready = statuses
        .iter()
        .filter(|cs| cs.get("ready").and_then(Value::as_bool).unwrap_or(false))
        .count();
    let total = item
        .pointer("/spec/containers")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let restarts: u64 = statuses
        .iter()
        .filter_map(|cs| cs.get("restartCount").and_then(Value::as_u64))
        .sum();
    let phase = item
        .pointer("/status/phase")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    vec![
        str_at(item, "/metadata/name"),
        format!("{}/{}", ready, total),
        phase.to_string(),
        restarts.to_string(),
        age(item),
    ]
}

fn service_row(item: &Value) -> Vec<String> {
    let ports = item
        .pointer("/spec/ports")
        .and_then(Value::as_array)
        .map(|ports| {
            ports
                .iter()
                .map(|p| {
                    format!(
                        "{}/{}",
                        p.get("port").and_then(Value::as_u64).unwrap_or(0),
                        p.get("protocol").and_then(Value::as_str).unwrap_or("TCP"),
                    )
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    vec![
        str_at(item, "/metadata/name"),
        str_at(item, "/spec/type"),
        str_at(item, "/spec/clusterIP"),
        ports,
        age(item),
    ]
}

fn deployment_row(item: &Value) -> Vec<String> {
    let at = |ptr: &str| item.pointer(ptr).and_then(Value::as_u64).unwrap_or(0);
    vec![
        str_at(item, "/metadata/name"),
        format!("{}/{}", at("/status/readyReplicas"), at("/status/replicas")),
        at("/status/updatedReplicas").to_string(),
        at("/status/availableReplicas").to_string(),
        age(item),
    ]
}

fn namespace_row(item: &Value) -> Vec<String> {
    vec![
        str_at(item, "/metadata/name"),
        str_at(item, "/status/phase"),
        age(item),
    ]
}

fn node_row(item: &Value) -> Vec<String> {
    let ready = item
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|cond| {
            cond.get("type").and_then(Value::as_str) == Some("Ready")
                && cond.get("status").and_then(Value::as_str) == Some("True")
        });
    const ROLE_PREFIX: &str = "node-role.kubernetes.io/";
    let roles: Vec<String> = item
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(label, _)| {
            label
                .strip_prefix(ROLE_PREFIX)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
        })
        .collect();
    vec![
        str_at(item, "/metadata/name"),
        if ready { "Ready" } else { "NotReady" }.to_string(),
        if roles.is_empty() {
            "<none>".to_string()
        } else {
            roles.join(",")
        },
        age(item),
        str_at(item, "/status/nodeInfo/kubeletVersion"),
    ]
}

fn str_at(item: &Value, pointer: &str) -> String {
    item.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn age(item: &Value) -> String {
    let Some(ts) = item
        .pointer("/metadata/creationTimestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    else {
        return "<unknown>".to_string();
    };
    let secs = (Utc::now() - ts.with_timezone(&Utc)).num_seconds().max(0);
    format_age(secs)
}

fn format_age(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_age_boundaries() {
        assert_eq!(format_age(0), "0s");
        assert_eq!(format_age(59), "59s");
        assert_eq!(format_age(60), "1m");
        assert_eq!(format_age(3599), "59m");
        assert_eq!(format_age(3600), "1h");
        assert_eq!(format_age(86_399), "23h");
        assert_eq!(format_age(86_400), "1d");
        assert_eq!(format_age(200 * 86_400), "200d");
    }

    #[test]
    fn test_pod_row() {
        let item = json!({
            "metadata": {"name": "web-0"},
            "spec": {"containers": [{}, {}]},
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    {"ready": true, "restartCount": 2},
                    {"ready": false, "restartCount": 1}
                ]
            }
        });
        let row = pod_row(&item);
        assert_eq!(row[0], "web-0");
        assert_eq!(row[1], "1/2");
        assert_eq!(row[2], "Running");
        assert_eq!(row[3], "3");
        assert_eq!(row[4], "<unknown>");
    }

    #[test]
    fn test_service_row_joins_ports() {
        let item = json!({
            "metadata": {"name": "api"},
            "spec": {
                "type": "ClusterIP",
                "clusterIP": "10.0.0.1",
                "ports": [
                    {"port": 80, "protocol": "TCP"},
                    {"port": 9090, "protocol": "UDP"}
                ]
            }
        });
        let row = service_row(&item);
        assert_eq!(row[..4], ["api", "ClusterIP", "10.0.0.1", "80/TCP,9090/UDP"]);
    }

    #[test]
    fn test_deployment_row_defaults_missing_counts_to_zero() {
        let item = json!({
            "metadata": {"name": "web"},
            "status": {"replicas": 3, "readyReplicas": 2}
        });
        let row = deployment_row(&item);
        assert_eq!(row[1], "2/3");
        assert_eq!(row[2], "0");
        assert_eq!(row[3], "0");
    }

    #[test]
    fn test_node_row_roles_and_readiness() {
        let item = json!({
            "metadata": {
                "name": "node-1",
                "labels": {
                    "node-role.kubernetes.io/control-plane": "",
                    "kubernetes.io/os": "linux"
                }
            },
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "nodeInfo": {"kubeletVersion": "v1.30.2"}
            }
        });
        let row = node_row(&item);
        assert_eq!(row[1], "Ready");
        assert_eq!(row[2], "control-plane");
        assert_eq!(row[4], "v1.30.2");

        let bare = json!({"metadata": {"name": "node-2"}, "status": {}});
        let row = node_row(&bare);
        assert_eq!(row[1], "NotReady");
        assert_eq!(row[2], "<none>");
    }

    #[test]
    fn test_recent_timestamp_ages_in_seconds() {
        let item = json!({
            "metadata": {"creationTimestamp": Utc::now().to_rfc3339()}
        });
        assert!(age(&item).ends_with('s'));
    }

    #[test]
    fn test_build_table_rejects_missing_items() {
        let table = build_table(ResourceKind::Pods, &json!({"kind": "Status"}));
        assert_eq!(table.headers, vec!["ERROR"]);
    }

    #[test]
    fn test_build_table_headers_per_kind() {
        let empty = json!({"items": []});
        assert_eq!(
            build_table(ResourceKind::Namespaces, &empty).headers,
            vec!["NAME", "STATUS", "AGE"]
        );
        assert_eq!(
            build_table(ResourceKind::Nodes, &empty).headers,
            vec!["NAME", "STATUS", "ROLES", "AGE", "VERSION"]
        );
    }
}
