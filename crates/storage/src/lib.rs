//! Property stores for CollabLite objects.
//!
//! An object is nothing more than a map from property names to opaque
//! bytes, keyed by object id. Stores only need two essential operations:
//! an upsert of a single property and a full read of one object. Writes are
//! last-writer-wins at the (object, property) grain; the server never
//! retries a failed write.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use sync_types::{
    ObjectId,
    PropertyId,
};

mod memory;
mod null;
mod sled_store;
mod sqlite;

pub use memory::MemoryStore;
pub use null::NullStore;
pub use sled_store::SledStore;
pub use sqlite::SqliteStore;

/// One object's full persisted state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    pub object_id: ObjectId,
    pub properties: BTreeMap<PropertyId, Bytes>,
}

impl Object {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            properties: BTreeMap::new(),
        }
    }
}

/// Durable storage for object properties.
///
/// Implementations must be safe to call from multiple tasks, although the
/// server funnels every `add` through a single writer task anyway.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Upsert a single property. Last writer wins.
    async fn add(
        &self,
        object_id: &ObjectId,
        property_id: &PropertyId,
        data: Bytes,
    ) -> anyhow::Result<()>;

    /// Read an entire object. Unknown objects come back with an empty
    /// property map rather than an error.
    async fn get(&self, object_id: &ObjectId) -> anyhow::Result<Object>;

    /// Remove a single property. Removing an absent property is a no-op.
    async fn delete(&self, object_id: &ObjectId, property_id: &PropertyId) -> anyhow::Result<()>;

    /// Bulk-upsert an entire object.
    async fn import(&self, object: Object) -> anyhow::Result<()> {
        for (property_id, data) in object.properties {
            self.add(&object.object_id, &property_id, data).await?;
        }
        Ok(())
    }
}
