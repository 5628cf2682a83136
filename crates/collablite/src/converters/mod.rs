//! Adapters between application documents and the property-map model.
//!
//! A [`Converter`] is a pair of pure functions: one direction reflects the
//! application's native document onto the tracked mirror, marking changed
//! properties dirty so they get sent; the other reflects freshly confirmed
//! server state back into the document, guided by the per-property updated
//! flags. The server never interprets property data, so converters fully
//! own the encoding.

use sync_types::ObjectId;

use crate::base_client::TrackedObject;

mod json;
mod keyvalue;

pub use json::JsonConverter;
pub use keyvalue::KeyValueConverter;

pub trait Converter {
    type Doc;

    /// Reflect `doc` onto the mirror, reusing `existing` when it belongs to
    /// the same object. Properties whose bytes changed must come out dirty.
    fn to_object(
        &self,
        object_id: &ObjectId,
        existing: Option<TrackedObject>,
        doc: &Self::Doc,
    ) -> anyhow::Result<TrackedObject>;

    /// Reflect properties the server updated back into `doc`.
    fn from_object(&self, object: &TrackedObject, doc: &mut Self::Doc) -> anyhow::Result<()>;
}
