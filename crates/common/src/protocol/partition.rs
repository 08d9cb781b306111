// Partition addressing: `project:<projectId>:<scope>[:<entityPath>]`.

use crate::domain::constants::Scope;

const PREFIX: &str = "project:";

pub fn partition_for(project_id: &str, scope: Scope) -> String {
    format!("{PREFIX}{project_id}:{scope}")
}

/// Every top-level scope partition of a project.
pub fn project_partitions(project_id: &str) -> Vec<String> {
    Scope::ALL.iter().map(|scope| partition_for(project_id, *scope)).collect()
}

/// Narrows `base` to one entity, e.g. `project:p1:story:scene:s1`.
pub fn entity_partition(base: &str, suffix: &str) -> String {
    format!("{base}:{suffix}")
}

/// Project id embedded in a partition, if it has the expected shape.
pub fn project_id_from_partition(partition: &str) -> Option<&str> {
    let rest = partition.strip_prefix(PREFIX)?;
    let (project_id, _scope) = rest.split_once(':')?;
    (!project_id.is_empty()).then_some(project_id)
}

pub fn scope_of(partition: &str) -> Option<Scope> {
    let rest = partition.strip_prefix(PREFIX)?;
    let (_, tail) = rest.split_once(':')?;
    let scope = tail.split(':').next()?;
    scope.parse().ok()
}

/// True when `partition` equals `subscription` or extends it at a `:` boundary.
pub fn partition_matches(subscription: &str, partition: &str) -> bool {
    match partition.strip_prefix(subscription) {
        Some("") => true,
        Some(rest) => rest.starts_with(':'),
        None => false,
    }
}

/// Keeps the first occurrence of each non-empty partition.
pub fn dedupe_partitions<'a>(partitions: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut output: Vec<String> = Vec::new();
    for partition in partitions {
        if partition.is_empty() || output.iter().any(|existing| existing == partition) {
            continue;
        }
        output.push(partition.to_string());
    }
    output
}
