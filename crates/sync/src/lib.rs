//! The CollabLite server engine.
//!
//! Three kinds of tasks cooperate here, stitched together with bounded
//! channels:
//!
//! 1) A [`SessionWorker`] per client stream. It forwards the stream's
//! mutations into the router and ferries confirmations for the session's
//! current object back toward the stream.
//! 2) A fan-out worker per live object, owned by the [`ObjectRouter`]. It
//! serializes that object's mutations, hands each one to the writer, and
//! distributes the resulting confirmation to every subscriber.
//! 3) One [`Writer`] for the whole server, the single task that touches
//! the store.
//!
//! Ordering within an object falls out of the single fan-out worker;
//! there is no ordering across objects.

mod metrics;
mod router;
mod worker;
mod writer;

pub use router::{
    ObjectRouter,
    RouterOptions,
};
pub use worker::SessionWorker;
pub use writer::Writer;
