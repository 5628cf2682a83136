use axum::{
    extract::{
        Path,
        State,
    },
    http::StatusCode,
    Json,
};
use sync_types::{
    ObjectId,
    ObjectSnapshot,
};

use crate::LocalAppState;

/// Full snapshot of one object, for initial load and for resynchronizing
/// after the server dropped confirmations for a slow consumer. Unknown
/// objects come back with an empty property map.
pub async fn get_object(
    State(st): State<LocalAppState>,
    Path(object_id): Path<String>,
) -> Result<Json<ObjectSnapshot>, (StatusCode, String)> {
    let object_id: ObjectId = object_id
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{e}")))?;
    let object = st
        .store
        .get(&object_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(ObjectSnapshot {
        object_id: Some(object.object_id),
        properties: object.properties,
    }))
}

pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
