//! Tool-progress metadata envelope.
//!
//! Chunk metadata is a map keyed by tool or category name whose values are
//! always lists of opaque event objects, even when a single event arrived.
//! Keeping one shape means a consumer reading streamed chunks and one reading
//! the finished response handle the same structure.

use serde_json::{Map, Value};

/// Wraps every non-array value in a one-element array.
pub fn normalize_events(metadata: Map<String, Value>) -> Map<String, Value> {
    metadata
        .into_iter()
        .map(|(key, value)| (key, Value::Array(into_events(value))))
        .collect()
}

/// Appends the events in `source` onto `target`, key by key.
pub fn merge_events(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        let incoming = into_events(value.clone());
        match target.get_mut(key) {
            Some(Value::Array(existing)) => existing.extend(incoming),
            Some(existing) => {
                let mut events = vec![existing.take()];
                events.extend(incoming);
                *existing = Value::Array(events);
            }
            None => {
                target.insert(key.clone(), Value::Array(incoming));
            }
        }
    }
}

fn into_events(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
