use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rusqlite::{
    params,
    Connection,
};
use sync_types::{
    ObjectId,
    PropertyId,
};

use crate::{
    Object,
    ObjectStore,
};

/// SQL-backed store with a composite (object_id, property_id) primary key.
///
/// A single SQLite connection does not allow concurrent calls, so all
/// access goes through one mutex. The server's single-writer design means
/// this is never contended on the write path.
pub struct SqliteStore {
    inner: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let connection = Connection::open(path)?;
        // Idempotent, so run unconditionally.
        connection.execute_batch(PROPERTIES_INIT)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(connection)),
        })
    }
}

#[async_trait]
impl ObjectStore for SqliteStore {
    async fn add(
        &self,
        object_id: &ObjectId,
        property_id: &PropertyId,
        data: Bytes,
    ) -> anyhow::Result<()> {
        let connection = self.inner.lock();
        let mut stmt = connection.prepare_cached(UPSERT_PROPERTY)?;
        stmt.execute(params![object_id.as_str(), property_id.as_str(), data.as_ref()])?;
        Ok(())
    }

    async fn get(&self, object_id: &ObjectId) -> anyhow::Result<Object> {
        let connection = self.inner.lock();
        let mut stmt = connection.prepare_cached(SELECT_OBJECT)?;
        let rows = stmt.query_map(params![object_id.as_str()], |row| {
            let property_id: String = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            Ok((property_id, data))
        })?;

        let mut object = Object::new(object_id.clone());
        for row in rows {
            let (property_id, data) = row?;
            object
                .properties
                .insert(property_id.into(), Bytes::from(data));
        }
        Ok(object)
    }

    async fn delete(&self, object_id: &ObjectId, property_id: &PropertyId) -> anyhow::Result<()> {
        let connection = self.inner.lock();
        let mut stmt = connection.prepare_cached(DELETE_PROPERTY)?;
        stmt.execute(params![object_id.as_str(), property_id.as_str()])?;
        Ok(())
    }
}

const PROPERTIES_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS properties (
    object_id TEXT NOT NULL,
    property_id TEXT NOT NULL,
    data BLOB NOT NULL,

    PRIMARY KEY (object_id, property_id)
);
"#;

const UPSERT_PROPERTY: &str =
    "INSERT OR REPLACE INTO properties (object_id, property_id, data) VALUES (?1, ?2, ?3)";
const SELECT_OBJECT: &str = "SELECT property_id, data FROM properties WHERE object_id = ?1";
const DELETE_PROPERTY: &str =
    "DELETE FROM properties WHERE object_id = ?1 AND property_id = ?2";

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::SqliteStore;
    use crate::{
        Object,
        ObjectStore,
    };

    fn setup() -> anyhow::Result<(TempDir, SqliteStore)> {
        let tmp_dir = TempDir::with_prefix("sqlite_store_test")?;
        let path = tmp_dir.path().join("collablite.sqlite3");
        let store = SqliteStore::new(path.to_str().unwrap())?;
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
        assert_eq!(object.properties[&"x".into()], Bytes::from_static(b"1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let object_id = "obj1".parse()?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"red"))
            .await?;
        let before = store.get(&object_id).await?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"red"))
            .await?;
        assert_eq!(store.get(&object_id).await?, before);

        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"blue"))
            .await?;
        let object = store.get(&object_id).await?;
        assert_eq!(object.properties[&"color".into()], Bytes::from_static(b"blue"));
        assert_eq!(object.properties.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_bulk_upserts() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let object_id: sync_types::ObjectId = "obj1".parse()?;
        let mut object = Object::new(object_id.clone());
        object
            .properties
            .insert("a".into(), Bytes::from_static(b"1"));
        object
            .properties
            .insert("b".into(), Bytes::from_static(b"2"));
        store.import(object.clone()).await?;
        assert_eq!(store.get(&object_id).await?, object);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete() -> anyhow::Result<()> {
        let (_tmp_dir, store) = setup()?;
        let object_id = "obj1".parse()?;
        store
            .add(&object_id, &"color".into(), Bytes::from_static(b"red"))
            .await?;
        store.delete(&object_id, &"color".into()).await?;
        assert!(store.get(&object_id).await?.properties.is_empty());
        Ok(())
    }
}
