use std::sync::Arc;

use storage::{
    NullStore,
    ObjectStore,
    SledStore,
    SqliteStore,
};

use crate::config::StoreDriver;

pub fn connect_store(driver: StoreDriver, db_spec: &str) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match driver {
        StoreDriver::None => {
            tracing::info!("Persistence disabled, running as a pure relay");
            Arc::new(NullStore::new())
        },
        StoreDriver::Embedded => {
            let store = Arc::new(SledStore::open(db_spec)?);
            tracing::info!("Connected to sled at {db_spec}");
            store
        },
        StoreDriver::Sqlite => {
            let store = Arc::new(SqliteStore::new(db_spec)?);
            tracing::info!("Connected to SQLite at {db_spec}");
            store
        },
    };
    Ok(store)
}
