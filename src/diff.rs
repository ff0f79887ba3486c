use serde_json::Value;

/// One leaf difference between two JSON documents. `path` uses dotted keys
/// and numeric array indices (`groups.0.zones.1.name`).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Change {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

pub(crate) fn diff_json(previous: &Value, current: &Value, path_prefix: &str, changes: &mut Vec<Change>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(path_prefix, key);
                let prev_val = prev_map.get(key).unwrap_or(&Value::Null);
                diff_json(prev_val, curr_val, &path, changes);
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    changes.push(Change {
                        path: join(path_prefix, key),
                        old: prev_val.clone(),
                        new: Value::Null,
                    });
                }
            }
        }
        (Value::Array(prev_items), Value::Array(curr_items)) if prev_items.len() == curr_items.len() => {
            for (i, (prev_val, curr_val)) in prev_items.iter().zip(curr_items).enumerate() {
                diff_json(prev_val, curr_val, &join(path_prefix, &i.to_string()), changes);
            }
        }
        (Value::Null, Value::Object(_)) => {
            diff_json(&Value::Object(serde_json::Map::new()), current, path_prefix, changes);
        }
        (prev, curr) if prev != curr => {
            changes.push(Change {
                path: path_prefix.to_string(),
                old: prev.clone(),
                new: curr.clone(),
            });
        }
        _ => {}
    }
}
