// List and patch helpers shared by the reducer and collections.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::errors::ReducerError;

/// Inserts `value` at `index`. `None` or an index past the end appends.
pub fn insert_at_index<T>(list: &mut Vec<T>, value: T, index: Option<usize>) {
    match index {
        Some(index) if index < list.len() => list.insert(index, value),
        _ => list.push(value),
    }
}

/// Removes the first occurrence of `value`. Returns whether it was present.
pub fn remove_from<T: PartialEq>(list: &mut Vec<T>, value: &T) -> bool {
    match list.iter().position(|item| item == value) {
        Some(position) => {
            list.remove(position);
            true
        }
        None => false,
    }
}

/// Moves `value` to `index`, inserting it if absent. The list never holds it twice.
pub fn upsert_no_duplicate<T: PartialEq>(list: &mut Vec<T>, value: T, index: Option<usize>) {
    remove_from(list, &value);
    insert_at_index(list, value, index);
}

/// Clamps negative indices to zero.
pub fn normalize_index(index: Option<i64>) -> Option<usize> {
    index.map(|index| usize::try_from(index.max(0)).unwrap_or(usize::MAX))
}

/// Inserts `id` before the first entry whose `(createdAt, id)` key sorts after
/// the new one. Existing entries keep their relative order, so a list built
/// only through this function stays sorted by `(createdAt, id)`. Lists that
/// were reordered explicitly are not re-sorted.
pub fn insert_stable<F>(list: &mut Vec<String>, id: String, created_at: i64, key_of: F)
where
    F: Fn(&str) -> Option<i64>,
{
    if list.contains(&id) {
        return;
    }
    let position = list.iter().position(|existing| {
        let existing_ts = key_of(existing).unwrap_or(0);
        (existing_ts, existing.as_str()) > (created_at, id.as_str())
    });
    match position {
        Some(position) => list.insert(position, id),
        None => list.push(id),
    }
}

pub fn is_non_empty(value: &str) -> bool {
    !value.trim().is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Shallow merge: patch keys overwrite, others survive.
    Merge,
    /// Every non-protected key is replaced by the patch contents.
    Replace,
}

impl PatchMode {
    pub fn from_replace_flag(replace: bool) -> Self {
        if replace {
            Self::Replace
        } else {
            Self::Merge
        }
    }
}

/// Applies a JSON object patch to a serde entity. Keys in `protected` keep
/// their current values regardless of mode.
pub fn apply_patch<T>(
    entity: &T,
    patch: &Map<String, Value>,
    mode: PatchMode,
    protected: &[&str],
) -> Result<T, ReducerError>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(mut fields) =
        serde_json::to_value(entity).map_err(|err| ReducerError::InvalidPatch(err.to_string()))?
    else {
        return Err(ReducerError::InvalidPatch("entity is not an object".into()));
    };

    if mode == PatchMode::Replace {
        fields.retain(|key, _| protected.contains(&key.as_str()));
    }
    for (key, value) in patch {
        if protected.contains(&key.as_str()) {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|err| ReducerError::InvalidPatch(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn insert_at_index_bounds() {
        let mut list = vec![1, 2, 3];
        insert_at_index(&mut list, 0, Some(0));
        insert_at_index(&mut list, 9, Some(100));
        insert_at_index(&mut list, 7, None);
        insert_at_index(&mut list, 5, Some(2));
        assert_eq!(list, vec![0, 1, 5, 2, 3, 9, 7]);
    }

    #[test]
    fn upsert_moves_without_duplicating() {
        let mut list = vec!["a", "b", "c"];
        upsert_no_duplicate(&mut list, "c", Some(0));
        assert_eq!(list, vec!["c", "a", "b"]);
        upsert_no_duplicate(&mut list, "d", None);
        assert_eq!(list, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn normalize_clamps_negatives() {
        assert_eq!(normalize_index(Some(-4)), Some(0));
        assert_eq!(normalize_index(Some(3)), Some(3));
        assert_eq!(normalize_index(None), None);
    }

    #[test]
    fn stable_insert_keeps_existing_order() {
        let created = |id: &str| match id {
            "b" => Some(10),
            "a" => Some(5),
            "z" => Some(20),
            _ => None,
        };
        // existing entries are deliberately unsorted; they must not be re-sorted
        let mut list = vec!["b".to_string(), "a".to_string()];
        insert_stable(&mut list, "c".into(), 7, created);
        assert_eq!(list, vec!["c", "b", "a"]);

        let mut list = vec!["a".to_string(), "b".to_string()];
        insert_stable(&mut list, "m".into(), 10, created);
        assert_eq!(list, vec!["a", "b", "m"]);

        insert_stable(&mut list, "0".into(), 10, created);
        assert_eq!(list, vec!["a", "0", "b", "m"]);
    }

    #[test]
    fn stable_inserts_into_a_sorted_list_match_a_full_sort() {
        let created_at = |id: &str| id.strip_prefix('n').and_then(|n| n.parse::<i64>().ok()).map(|n| n % 5);
        // Arrival order scrambles both timestamps and ids; several share a timestamp.
        let arrivals = [7, 2, 9, 0, 4, 11, 5, 3, 10, 1, 8, 6];

        let mut list = Vec::new();
        for n in arrivals {
            let id = format!("n{n}");
            let ts = created_at(&id).unwrap();
            insert_stable(&mut list, id, ts, created_at);
        }

        let mut expected: Vec<String> = arrivals.iter().map(|n| format!("n{n}")).collect();
        expected.sort_by(|a, b| (created_at(a), a.as_str()).cmp(&(created_at(b), b.as_str())));
        assert_eq!(list, expected);

        // Re-inserting an existing id is a no-op.
        insert_stable(&mut list, "n3".into(), 3, created_at);
        assert_eq!(list, expected);
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Entity {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    }

    #[test]
    fn merge_patch_respects_protected_keys() {
        let entity = Entity { id: "e1".into(), name: Some("old".into()), extra: Map::new() };
        let patch = json!({ "id": "hijack", "name": "new", "color": "red" });
        let patched =
            apply_patch(&entity, patch.as_object().unwrap(), PatchMode::Merge, &["id"]).unwrap();
        assert_eq!(patched.id, "e1");
        assert_eq!(patched.name.as_deref(), Some("new"));
        assert_eq!(patched.extra["color"], "red");
    }

    #[test]
    fn replace_patch_drops_unlisted_keys() {
        let mut extra = Map::new();
        extra.insert("color".into(), json!("red"));
        let entity = Entity { id: "e1".into(), name: Some("old".into()), extra };
        let patch = json!({ "size": 3 });
        let patched =
            apply_patch(&entity, patch.as_object().unwrap(), PatchMode::Replace, &["id"]).unwrap();
        assert_eq!(patched.id, "e1");
        assert_eq!(patched.name, None);
        assert!(!patched.extra.contains_key("color"));
        assert_eq!(patched.extra["size"], 3);
    }
}
