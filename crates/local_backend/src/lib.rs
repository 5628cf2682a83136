use std::sync::Arc;

use storage::ObjectStore;
use sync::{
    ObjectRouter,
    RouterOptions,
    Writer,
};

pub mod api;
pub mod config;
pub mod persistence;
pub mod router;
pub mod subs;

/// Everything a request handler needs: the subscription router and the
/// store behind the snapshot endpoint.
#[derive(Clone)]
pub struct LocalAppState {
    pub router: ObjectRouter,
    pub store: Arc<dyn ObjectStore>,
}

/// Wire up the engine: spawn the writer and hand the router its queue
/// sizing.
pub fn make_app(store: Arc<dyn ObjectStore>, options: RouterOptions) -> LocalAppState {
    let writer = Writer::start(store.clone());
    let router = ObjectRouter::new(writer, options);
    LocalAppState { router, store }
}
