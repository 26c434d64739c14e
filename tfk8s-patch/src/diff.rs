use std::collections::BTreeMap;

use serde_json::Value;

use crate::{child_path, PatchOperation, PatchOperations};

/// Compute the operations that turn the map at `path_prefix` from `old` into
/// `new`.
///
/// Removals come first, then replacements, then additions, each group in
/// ascending key order. When `old` is empty the whole `new` map is added at
/// the prefix itself, because the parent object may not exist yet and adding
/// its members one by one would fail. There is no such shortcut for removing
/// everything: keys not known to `old` may be managed by someone else and
/// must survive.
pub fn diff_map<V>(
    path_prefix: &str,
    old: &BTreeMap<String, V>,
    new: &BTreeMap<String, V>,
) -> PatchOperations
where
    V: Clone + PartialEq + Into<Value>,
{
    let parent = path_prefix.strip_suffix('/').unwrap_or(path_prefix);

    if old.is_empty() {
        if new.is_empty() {
            return PatchOperations::new();
        }
        let object = new
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into()))
            .collect::<serde_json::Map<_, _>>();
        return PatchOperations(vec![PatchOperation::add(parent, Value::Object(object))]);
    }

    let mut removals = Vec::new();
    let mut replacements = Vec::new();
    let mut additions = Vec::new();

    for key in old.keys() {
        if !new.contains_key(key) {
            removals.push(PatchOperation::remove(child_path(parent, key)));
        }
    }

    for (key, value) in new {
        match old.get(key) {
            Some(previous) if previous == value => {}
            Some(_) => {
                replacements.push(PatchOperation::replace(
                    child_path(parent, key),
                    value.clone(),
                ));
            }
            None => {
                additions.push(PatchOperation::add(child_path(parent, key), value.clone()));
            }
        }
    }

    removals
        .into_iter()
        .chain(replacements)
        .chain(additions)
        .collect()
}
