use serde_json::{Map, Value};

/// Collect `(path, old, new)` for every leaf that differs between two JSON
/// documents. Array elements are addressed by index (`zones.0.temperature`).
/// Keys only present in `previous` are not reported.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    let join = |key: &str| {
        if path_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{path_prefix}.{key}")
        }
    };

    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(key.as_str());
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(Map::new()), curr_val, &path, changes)
                    }
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
        }
        (Value::Array(prev_arr), Value::Array(curr_arr)) if prev_arr.len() == curr_arr.len() => {
            for (i, (prev_val, curr_val)) in prev_arr.iter().zip(curr_arr).enumerate() {
                diff_json(prev_val, curr_val, &join(i.to_string().as_str()), changes);
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}
