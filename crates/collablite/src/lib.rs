//! Client library for CollabLite, a lightweight collaborative-editing
//! service.
//!
//! A [`CollabClient`] attaches to one shared object at a time, pushes
//! per-property mutations at the server, and receives the fan-out of every
//! accepted mutation: its own sends come back as confirmations and
//! everyone else's as updates. Echo suppression and the last-writer-wins
//! conflict filter live in [`BaseCollabClient`] and run before anything
//! reaches the application.

mod base_client;
mod client;
pub mod converters;
mod sync;

pub use base_client::{
    BaseCollabClient,
    ReceiveOutcome,
    TrackedObject,
    TrackedProperty,
};
pub use client::{
    CollabClient,
    ObjectUpdate,
    UpdateKind,
};
pub use sync::{
    ProtocolResponse,
    ReconnectRequest,
    SyncProtocol,
};
pub use sync_types::{
    ClientId,
    Confirmation,
    Mutation,
    ObjectId,
    ObjectSnapshot,
    PropertyId,
};
