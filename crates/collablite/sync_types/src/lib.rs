//! Wire types for the CollabLite sync protocol, shared between the client
//! SDK and the server.
//!
//! A connected client speaks a single-frame protocol over its WebSocket:
//! [`Mutation`] frames travel client → server and [`Confirmation`] frames
//! travel server → client. Both carry the same payload; a confirmation is
//! the authoritative, post-acceptance form of a mutation. Property data is
//! opaque bytes, carried as base64 inside the JSON frames.

use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
};

use bytes::Bytes;
use serde::{
    Deserialize,
    Serialize,
};

pub mod backoff;

#[derive(Debug, thiserror::Error)]
#[error("object id must not be empty")]
pub struct EmptyObjectId;

/// Identifier of a shared object. Opaque, but never empty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectId {
    type Error = EmptyObjectId;

    fn try_from(s: String) -> Result<Self, EmptyObjectId> {
        if s.is_empty() {
            return Err(EmptyObjectId);
        }
        Ok(Self(s))
    }
}

impl FromStr for ObjectId {
    type Err = EmptyObjectId;

    fn from_str(s: &str) -> Result<Self, EmptyObjectId> {
        Self::try_from(s.to_owned())
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> String {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one property within an object.
///
/// The empty string is reserved: a mutation whose property id is empty
/// carries no data and only registers interest in its object (see
/// [`Mutation::attach`]).
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PropertyId(String);

impl PropertyId {
    /// The subscribe-only sentinel.
    pub fn attach_marker() -> Self {
        Self(String::new())
    }

    pub fn is_attach_marker(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PropertyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PropertyId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one editing party.
///
/// Clients assign themselves one (`ClientId::generate()`) and stamp it on
/// every outgoing mutation as the origin; the server also assigns a fresh
/// one to each accepted stream. Confirmations echo the origin unchanged,
/// which is what lets a client recognize its own edits coming back.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// A random 128-bit identity rendered as text.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A client's request to set one property of one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    #[serde(default, with = "base64_bytes")]
    pub data: Bytes,
    pub origin_id: ClientId,
}

impl Mutation {
    /// The subscribe-only frame: registers interest in `object_id` without
    /// mutating anything. Never persisted and never fanned out.
    pub fn attach(object_id: ObjectId, origin_id: ClientId) -> Self {
        Self {
            object_id,
            property_id: PropertyId::attach_marker(),
            data: Bytes::new(),
            origin_id,
        }
    }
}

/// The server's authoritative echo of an accepted [`Mutation`], delivered
/// to every subscriber of the object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    #[serde(default, with = "base64_bytes")]
    pub data: Bytes,
    pub origin_id: ClientId,
}

impl From<Mutation> for Confirmation {
    fn from(m: Mutation) -> Self {
        Self {
            object_id: m.object_id,
            property_id: m.property_id,
            data: m.data,
            origin_id: m.origin_id,
        }
    }
}

/// Full state of one object, as returned by the unary snapshot endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSnapshot {
    pub object_id: Option<ObjectId>,
    #[serde(default, with = "base64_property_map")]
    pub properties: BTreeMap<PropertyId, Bytes>,
}

/// Property data is opaque bytes; JSON carries it base64-encoded. A missing
/// or `null` field decodes to empty bytes, matching the nil payload of a
/// subscribe-only frame.
mod base64_bytes {
    use bytes::Bytes;
    use serde::{
        de::Error as _,
        Deserialize,
        Deserializer,
        Serializer,
    };

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => base64::decode(&encoded)
                .map(Bytes::from)
                .map_err(D::Error::custom),
            None => Ok(Bytes::new()),
        }
    }
}

mod base64_property_map {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use serde::{
        de::Error as _,
        Deserialize,
        Deserializer,
        Serializer,
    };

    use super::PropertyId;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<PropertyId, Bytes>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(k, v)| (k, base64::encode(v))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PropertyId, Bytes>, D::Error> {
        let encoded = BTreeMap::<PropertyId, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| Ok((k, Bytes::from(base64::decode(&v).map_err(D::Error::custom)?))))
            .collect()
    }
}
