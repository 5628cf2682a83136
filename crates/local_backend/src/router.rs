use axum::{
    routing::get,
    Router,
};

use crate::{
    api,
    subs,
    LocalAppState,
};

pub fn router(st: LocalAppState) -> Router {
    Router::new()
        .route("/api/attach", get(subs::attach))
        .route("/api/object/{object_id}", get(api::get_object))
        .route("/version", get(api::version))
        .with_state(st)
}
