use std::collections::BTreeMap;

use bytes::Bytes;
use sync_types::ObjectId;

use crate::{
    base_client::TrackedObject,
    converters::Converter,
};

/// The identity converter: the document already is a flat map of property
/// names to bytes.
pub struct KeyValueConverter;

impl Converter for KeyValueConverter {
    type Doc = BTreeMap<String, Bytes>;

    fn to_object(
        &self,
        object_id: &ObjectId,
        existing: Option<TrackedObject>,
        doc: &Self::Doc,
    ) -> anyhow::Result<TrackedObject> {
        let mut object = existing
            .filter(|object| object.object_id() == object_id)
            .unwrap_or_else(|| TrackedObject::new(object_id.clone()));
        for (key, value) in doc {
            object.adjust_property(key.as_str().into(), value.clone(), true, false);
        }
        Ok(object)
    }

    fn from_object(&self, object: &TrackedObject, doc: &mut Self::Doc) -> anyhow::Result<()> {
        for (property_id, property) in object.properties() {
            if property.updated {
                tracing::debug!("got update for property {property_id}");
                doc.insert(property_id.to_string(), property.data.clone());
            }
        }
        Ok(())
    }
}
