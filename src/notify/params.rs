//! Parameter construction for notification query strings (§6).
//!
//! Operates on the orchestrator's *raw* descriptors (`ServiceDescriptor`,
//! `NodeDescriptor`), not the minified cache projections (`ServiceMini` /
//! `NodeMini`) — short-name stripping needs `com.docker.stack.namespace`,
//! which lives outside the `com.df.` prefix the projections retain.

use std::collections::BTreeMap;

use crate::entity::NodeMini;
use crate::orchestrator::{NodeDescriptor, ServiceDescriptor};

pub(crate) const DF_PREFIX: &str = "com.df.";
const STACK_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";
const SHORT_NAME_LABEL: &str = "com.df.shortName";

/// Applies the `com.df.shortName` stack-prefix-stripping rule (§6). Exposed
/// crate-wide so the swarm listener (C8) can bake the short name into the
/// cached projection at observation time, while the raw label that drives it
/// (`com.docker.stack.namespace`) is still in scope — by the time a remove
/// event is handled the live descriptor is already gone.
pub(crate) fn short_service_name(service: &ServiceDescriptor) -> String {
    let short_name_requested = service
        .labels
        .get(SHORT_NAME_LABEL)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    match (short_name_requested, service.labels.get(STACK_NAMESPACE_LABEL)) {
        (true, Some(stack_name)) if !stack_name.is_empty() => {
            let prefix = format!("{stack_name}_");
            service
                .name
                .strip_prefix(prefix.as_str())
                .unwrap_or(&service.name)
                .to_string()
        }
        _ => service.name.clone(),
    }
}

fn df_labels(labels: &BTreeMap<String, String>, notify_label: &str) -> BTreeMap<String, String> {
    labels
        .iter()
        .filter(|(k, _)| k.starts_with(DF_PREFIX))
        .filter(|(k, _)| k.as_str() != notify_label)
        .map(|(k, v)| (k[DF_PREFIX.len()..].to_string(), v.clone()))
        .collect()
}

/// Builds create-notification parameters for a service (§6). Returns `None`
/// when the service should be skipped entirely: `Replicated{replicas: 0}`
/// with no `Global` counterpart (§7's implicit filter, restated from
/// `Mode::has_zero_replicas`).
pub fn service_create_params(
    service: &ServiceDescriptor,
    notify_label: &str,
) -> Option<BTreeMap<String, String>> {
    if service.mode.has_zero_replicas() {
        return None;
    }

    let mut params = df_labels(&service.labels, notify_label);
    params.insert("serviceName".to_string(), short_service_name(service));

    if let crate::entity::Mode::Replicated { replicas } = service.mode {
        params.insert("replicas".to_string(), replicas.to_string());
    }

    params
        .entry("distribute".to_string())
        .or_insert_with(|| "true".to_string());

    if let Some(node_info) = &service.node_info {
        let pairs: Vec<[String; 2]> = node_info
            .iter()
            .map(|(name, addr)| [name.clone(), addr.clone()])
            .collect();
        if let Ok(json) = serde_json::to_string(&pairs) {
            params.insert("nodeInfo".to_string(), json);
        }
    }

    Some(params)
}

/// Builds remove-notification parameters for a service (§6). Operates on the
/// projection drained from the cache, since the live descriptor may already
/// be gone by the time a remove event is processed.
pub fn service_remove_params(name: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("serviceName".to_string(), name.to_string());
    params.insert("distribute".to_string(), "true".to_string());
    params
}

/// Builds notification parameters for a node (§6), used for both create and
/// remove — the original system has no separate node "remove" parameter
/// shape.
pub fn node_params(node: &NodeDescriptor) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("nodeID".to_string(), node.id.clone());
    params.insert("hostname".to_string(), node.hostname.clone());
    params.insert(
        "manager".to_string(),
        (node.role == crate::entity::Role::Manager).to_string(),
    );

    for (k, v) in df_labels(&node.node_labels, "") {
        params.insert(k, v);
    }

    params
}

/// Builds node parameters directly from a cached projection, used on the
/// remove path once the live `NodeDescriptor` is already gone.
pub fn node_mini_params(mini: &NodeMini) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("nodeID".to_string(), mini.id.clone());
    params.insert("hostname".to_string(), mini.hostname.clone());
    params.insert(
        "manager".to_string(),
        (mini.role == crate::entity::Role::Manager).to_string(),
    );
    for (k, v) in &mini.node_labels {
        params.insert(k.clone(), v.clone());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Mode;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn service(name: &str, mode: Mode, labels_: &[(&str, &str)]) -> ServiceDescriptor {
        ServiceDescriptor {
            id: "id1".to_string(),
            name: name.to_string(),
            labels: labels(labels_),
            mode,
            node_info: None,
        }
    }

    #[test]
    fn scenario_a_dedup_shape() {
        let svc = service(
            "S1",
            Mode::Replicated { replicas: 1 },
            &[("com.df.notify", "true")],
        );
        let params = service_create_params(&svc, "com.df.notify").unwrap();
        assert_eq!(params.get("serviceName"), Some(&"S1".to_string()));
        assert_eq!(params.get("replicas"), Some(&"1".to_string()));
        assert_eq!(params.get("distribute"), Some(&"true".to_string()));
    }

    #[test]
    fn scenario_c_label_overrides_default_distribute() {
        let svc = service(
            "S1",
            Mode::Replicated { replicas: 1 },
            &[("com.df.notify", "true"), ("com.df.distribute", "false")],
        );
        let params = service_create_params(&svc, "com.df.notify").unwrap();
        assert_eq!(params.get("distribute"), Some(&"false".to_string()));
        assert_eq!(params.get("serviceName"), Some(&"S1".to_string()));
        assert_eq!(params.get("replicas"), Some(&"1".to_string()));

        let remove = service_remove_params("S1");
        assert_eq!(remove.get("distribute"), Some(&"true".to_string()));
        assert_eq!(remove.get("serviceName"), Some(&"S1".to_string()));
    }

    #[test]
    fn scenario_e_short_name_stripping() {
        let svc = service(
            "mystack_web",
            Mode::Replicated { replicas: 1 },
            &[
                ("com.df.notify", "true"),
                ("com.df.shortName", "true"),
                ("com.docker.stack.namespace", "mystack"),
            ],
        );
        let params = service_create_params(&svc, "com.df.notify").unwrap();
        assert_eq!(params.get("serviceName"), Some(&"web".to_string()));
        assert_eq!(params.get("shortName"), Some(&"true".to_string()));
    }

    #[test]
    fn short_name_not_stripped_without_stack_namespace() {
        let svc = service(
            "mystack_web",
            Mode::Replicated { replicas: 1 },
            &[("com.df.notify", "true"), ("com.df.shortName", "true")],
        );
        let params = service_create_params(&svc, "com.df.notify").unwrap();
        assert_eq!(params.get("serviceName"), Some(&"mystack_web".to_string()));
    }

    #[test]
    fn zero_replicas_without_global_is_skipped() {
        let svc = service(
            "S1",
            Mode::Replicated { replicas: 0 },
            &[("com.df.notify", "true")],
        );
        assert!(service_create_params(&svc, "com.df.notify").is_none());
    }

    #[test]
    fn global_mode_has_no_replicas_param() {
        let svc = service("S1", Mode::Global, &[("com.df.notify", "true")]);
        let params = service_create_params(&svc, "com.df.notify").unwrap();
        assert!(!params.contains_key("replicas"));
    }

    #[test]
    fn scenario_f_node_params() {
        let node = NodeDescriptor {
            id: "n1".to_string(),
            hostname: "host-a".to_string(),
            version_index: 1,
            state: crate::entity::NodeState::Ready,
            address: "10.0.0.1".to_string(),
            node_labels: labels(&[
                ("com.df.wow", "cats"),
                ("com.df.cows", "fly"),
                ("com.df2.x", "y"),
            ]),
            engine_labels: BTreeMap::new(),
            role: crate::entity::Role::Manager,
            availability: crate::entity::Availability::Active,
        };
        let params = node_params(&node);
        assert_eq!(params.get("nodeID"), Some(&"n1".to_string()));
        assert_eq!(params.get("hostname"), Some(&"host-a".to_string()));
        assert_eq!(params.get("manager"), Some(&"true".to_string()));
        assert_eq!(params.get("wow"), Some(&"cats".to_string()));
        assert_eq!(params.get("cows"), Some(&"fly".to_string()));
        assert!(!params.contains_key("x"));
    }

    #[test]
    fn node_mini_params_matches_node_params_shape() {
        use crate::entity::{filter_labels, NodeState, Role};

        let node = NodeDescriptor {
            id: "n1".to_string(),
            hostname: "host-a".to_string(),
            version_index: 1,
            state: NodeState::Ready,
            address: "10.0.0.1".to_string(),
            node_labels: labels(&[("com.df.wow", "cats")]),
            engine_labels: BTreeMap::new(),
            role: Role::Manager,
            availability: crate::entity::Availability::Active,
        };
        let from_descriptor = node_params(&node);

        let mini = NodeMini {
            id: node.id.clone(),
            hostname: node.hostname.clone(),
            version_index: node.version_index,
            state: node.state.clone(),
            address: node.address.clone(),
            node_labels: filter_labels(node.node_labels.iter(), DF_PREFIX, None),
            engine_labels: BTreeMap::new(),
            role: node.role,
            availability: node.availability,
        };
        let from_mini = node_mini_params(&mini);

        assert_eq!(from_descriptor, from_mini);
    }
}
