//! Node and pod inventory extraction
//!
//! Best-effort field extraction from cluster API list responses. Items that
//! lack a name are skipped; every other missing field simply stays `None`.

use crate::models::{ContainerResourceSpec, NodeDescriptor, PodGroup};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Node label carrying the node role
pub const ROLE_LABEL: &str = "kubernetes.io/role";

fn generated_suffix() -> &'static Regex {
    static GENERATED_SUFFIX: OnceLock<Regex> = OnceLock::new();
    GENERATED_SUFFIX.get_or_init(|| {
        Regex::new(r"-?[[:alnum:]]{7,10}-[[:alnum:]]{4,5}($|_)").expect("generated suffix pattern")
    })
}

/// Strip the replica-set hash and pod hash the orchestrator appends to a pod name
///
/// `checkout-7998cf8c7d-c6d87` becomes `checkout`; names without a generated
/// suffix come back unchanged. The match is by shape only, so a hand-written
/// name ending in two segments of the same lengths is shortened too
/// (`my-app-backend-main` becomes `my-app`).
pub fn canonical_pod_name(name: &str) -> String {
    generated_suffix().replace_all(name, "").into_owned()
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn items(list: &Value) -> impl Iterator<Item = &Value> {
    list.get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Extract node descriptors from a `NodeList` response
pub fn parse_node_list(list: &Value) -> Vec<NodeDescriptor> {
    items(list)
        .filter_map(|item| {
            let name = str_at(item, "/metadata/name")?;
            let role = item
                .pointer("/metadata/labels")
                .and_then(|labels| labels.get(ROLE_LABEL))
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(NodeDescriptor {
                name: name.to_string(),
                role,
            })
        })
        .collect()
}

fn parse_container(container: &Value) -> Option<ContainerResourceSpec> {
    let quantity = |pointer: &str| str_at(container, pointer).map(str::to_string);

    Some(ContainerResourceSpec {
        name: str_at(container, "/name")?.to_string(),
        cpu_limit: quantity("/resources/limits/cpu"),
        memory_limit: quantity("/resources/limits/memory"),
        cpu_request: quantity("/resources/requests/cpu"),
        memory_request: quantity("/resources/requests/memory"),
    })
}

/// Extract pod groups from a `PodList` response
///
/// Groups are returned in the order their first pod appears. The first pod
/// of each group is its representative: its node and container specs are
/// the ones reported for the whole group.
pub fn parse_pod_list(list: &Value) -> Vec<PodGroup> {
    let mut groups: Vec<PodGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items(list) {
        let Some(name) = str_at(item, "/metadata/name") else {
            continue;
        };
        let canonical = canonical_pod_name(name);

        if let Some(&slot) = index.get(&canonical) {
            groups[slot].pod_count += 1;
            continue;
        }

        let containers = item
            .pointer("/spec/containers")
            .and_then(Value::as_array)
            .map(|containers| containers.iter().filter_map(parse_container).collect())
            .unwrap_or_default();

        index.insert(canonical.clone(), groups.len());
        groups.push(PodGroup {
            name: canonical,
            pod_count: 1,
            node_name: str_at(item, "/spec/nodeName").map(str::to_string),
            containers,
        });
    }

    groups
}
