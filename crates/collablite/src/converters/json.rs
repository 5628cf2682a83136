use bytes::Bytes;
use serde_json::Value as JsonValue;
use sync_types::{
    ObjectId,
    PropertyId,
};

use crate::{
    base_client::TrackedObject,
    converters::Converter,
};

/// Maps a JSON document onto properties by flattening nested objects into
/// dot-separated paths (`{"a": {"b": 1}}` becomes property `a.b`). Leaf
/// values are stored as their JSON encoding, so they round-trip exactly.
/// Arrays are treated as leaves.
pub struct JsonConverter;

impl Converter for JsonConverter {
    type Doc = JsonValue;

    fn to_object(
        &self,
        object_id: &ObjectId,
        existing: Option<TrackedObject>,
        doc: &Self::Doc,
    ) -> anyhow::Result<TrackedObject> {
        let mut object = existing
            .filter(|object| object.object_id() == object_id)
            .unwrap_or_else(|| TrackedObject::new(object_id.clone()));
        let mut leaves = Vec::new();
        flatten("", doc, &mut leaves);
        for (path, value) in leaves {
            let data = Bytes::from(serde_json::to_vec(value)?);
            object.adjust_property(path.into(), data, true, false);
        }
        Ok(object)
    }

    fn from_object(&self, object: &TrackedObject, doc: &mut Self::Doc) -> anyhow::Result<()> {
        for (property_id, property) in object.properties() {
            if !property.updated {
                continue;
            }
            let value: JsonValue = serde_json::from_slice(&property.data)?;
            set_path(doc, property_id, value);
        }
        Ok(())
    }
}

fn flatten<'a>(prefix: &str, value: &'a JsonValue, out: &mut Vec<(String, &'a JsonValue)>) {
    match value {
        JsonValue::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, nested, out);
            }
        },
        leaf => {
            if prefix.is_empty() {
                // A bare scalar at the top level has no property name to
                // live under; nothing to send.
                return;
            }
            out.push((prefix.to_owned(), leaf));
        },
    }
}

/// Write `value` at a dot-separated path, creating intermediate objects and
/// overwriting non-objects along the way.
fn set_path(doc: &mut JsonValue, path: &PropertyId, value: JsonValue) {
    let mut current = doc;
    let mut segments = path.as_str().split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = JsonValue::Object(serde_json::Map::new());
        }
        let map = current.as_object_mut().expect("just made this an object");
        if segments.peek().is_none() {
            map.insert(segment.to_owned(), value);
            return;
        }
        current = map.entry(segment.to_owned()).or_insert(JsonValue::Null);
    }
}
