use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use sled::Mode::HighThroughput;
use sync_types::{
    ObjectId,
    PropertyId,
};

use crate::{
    Object,
    ObjectStore,
};

/// Embedded key/value store.
///
/// Properties are stored under `"<objectID>:<propertyID>"` keys so that one
/// object's properties form a contiguous prefix range; `get` is a prefix
/// scan over `"<objectID>:"`. Object ids therefore must not contain `:`.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = sled::Config::default()
            .path(path)
            .flush_every_ms(Some(50))
            .mode(HighThroughput);
        let db = config.open()?;
        Ok(Self { db })
    }

    fn property_key(object_id: &ObjectId, property_id: &PropertyId) -> Vec<u8> {
        format!("{object_id}:{property_id}").into_bytes()
    }
}

#[async_trait]
impl ObjectStore for SledStore {
    async fn add(
        &self,
        object_id: &ObjectId,
        property_id: &PropertyId,
        data: Bytes,
    ) -> anyhow::Result<()> {
        self.db
            .insert(Self::property_key(object_id, property_id), data.as_ref())?;
        Ok(())
    }

    async fn get(&self, object_id: &ObjectId) -> anyhow::Result<Object> {
        let prefix = format!("{object_id}:");
        let mut object = Object::new(object_id.clone());
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let key = std::str::from_utf8(&key)?;
            let property_id = key
                .strip_prefix(&prefix)
                .ok_or_else(|| anyhow::anyhow!("scanned key {key:?} outside prefix {prefix:?}"))?;
            object
                .properties
                .insert(property_id.into(), Bytes::from(value.to_vec()));
        }
        Ok(object)
    }

    async fn delete(&self, object_id: &ObjectId, property_id: &PropertyId) -> anyhow::Result<()> {
        self.db.remove(Self::property_key(object_id, property_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::SledStore;
    use crate::ObjectStore;

    fn setup() -> anyhow::Result<(TempDir, SledStore)> {
        let tmp_dir = TempDir::with_prefix("sled_store_test")?;
        let store = SledStore::open(tmp_dir.path())?;
        Ok((tmp_dir, store))
    }

    #[tokio::test]
    async fn test_add_and_get() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let object_id = "obj1".parse()?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"red"))
            .await?;
        store
            .add(&object_id, &"x".into(), Bytes::from_static(b"1"))
            .await?;

        let object = store.get(&object_id).await?;
        assert_eq!(object.properties.len(), 2);
        assert_eq!(object.properties[&"color".into()], Bytes::from_static(b"red"));
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_overwrites() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let object_id = "obj1".parse()?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"red"))
            .await?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"blue"))
            .await?;
        let object = store.get(&object_id).await?;
        assert_eq!(object.properties.len(), 1);
        assert_eq!(object.properties[&"color".into()], Bytes::from_static(b"blue"));
        Ok(())
    }

    #[tokio::test]
    async fn test_objects_do_not_bleed_across_prefixes() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let obj1 = "obj1".parse()?;
        let obj10 = "obj10".parse()?;
        store
            .add(&obj1, &"a".into(), Bytes::from_static(b"1"))
            .await?;
        store
            .add(&obj10, &"b".into(), Bytes::from_static(b"2"))
            .await?;

        // "obj10:b" begins with "obj1" but not with "obj1:".
        let object = store.get(&obj1).await?;
        assert_eq!(object.properties.len(), 1);
        assert!(object.properties.contains_key(&"a".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_and_missing_get() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let object_id = "obj1".parse()?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"red"))
            .await?;
        store.delete(&object_id, &"color".into()).await?;
        assert!(store.get(&object_id).await?.properties.is_empty());
        assert!(store.get(&"missing".parse()?).await?.properties.is_empty());
        Ok(())
    }
}
