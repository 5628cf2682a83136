use async_trait::async_trait;
use bytes::Bytes;
use sync_types::{
    ObjectId,
    PropertyId,
};

use crate::{
    Object,
    ObjectStore,
};

/// A store that durably stores nothing.
///
/// Useful when running the server purely as a live relay: every write is
/// accepted and discarded, every read comes back empty.
#[derive(Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ObjectStore for NullStore {
    async fn add(
        &self,
        _object_id: &ObjectId,
        _property_id: &PropertyId,
        _data: Bytes,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get(&self, object_id: &ObjectId) -> anyhow::Result<Object> {
        Ok(Object::new(object_id.clone()))
    }

    async fn delete(&self, _object_id: &ObjectId, _property_id: &PropertyId) -> anyhow::Result<()> {
        Ok(())
    }
}
