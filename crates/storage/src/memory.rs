use std::collections::{
    BTreeMap,
    HashMap,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sync_types::{
    ObjectId,
    PropertyId,
};

use crate::{
    Object,
    ObjectStore,
};

/// In-memory store, used by tests and as a reference implementation.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectId, BTreeMap<PropertyId, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn add(
        &self,
        object_id: &ObjectId,
        property_id: &PropertyId,
        data: Bytes,
    ) -> anyhow::Result<()> {
        self.objects
            .lock()
            .entry(object_id.clone())
            .or_default()
            .insert(property_id.clone(), data);
        Ok(())
    }

    async fn get(&self, object_id: &ObjectId) -> anyhow::Result<Object> {
        let properties = self
            .objects
            .lock()
            .get(object_id)
            .cloned()
            .unwrap_or_default();
        Ok(Object {
            object_id: object_id.clone(),
            properties,
        })
    }

    async fn delete(&self, object_id: &ObjectId, property_id: &PropertyId) -> anyhow::Result<()> {
        if let Some(properties) = self.objects.lock().get_mut(object_id) {
            properties.remove(property_id);
        }
        Ok(())
    }
}
