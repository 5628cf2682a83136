use std::collections::{
    btree_map::Entry,
    BTreeMap,
};

use bytes::Bytes;
use sync_types::{
    ClientId,
    Confirmation,
    Mutation,
    ObjectId,
    PropertyId,
};

/// One property of the client's local mirror.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedProperty {
    pub data: Bytes,
    /// Changed locally and not yet sent to the server.
    pub dirty: bool,
    /// Freshly applied from the server; the application has not observed it
    /// yet.
    pub updated: bool,
}

/// The client's mirror of the object it is attached to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedObject {
    object_id: ObjectId,
    properties: BTreeMap<PropertyId, TrackedProperty>,
}

impl TrackedObject {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            properties: BTreeMap::new(),
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn properties(&self) -> &BTreeMap<PropertyId, TrackedProperty> {
        &self.properties
    }

    /// Set a property's data and flags. Writing bytes identical to what the
    /// mirror already holds is a no-op, so re-applying the same value never
    /// re-marks a property.
    pub fn adjust_property(&mut self, property_id: PropertyId, data: Bytes, dirty: bool, updated: bool) {
        match self.properties.entry(property_id) {
            Entry::Occupied(mut entry) => {
                let property = entry.get_mut();
                if property.data != data {
                    property.data = data;
                    property.dirty = dirty;
                    property.updated = updated;
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(TrackedProperty {
                    data,
                    dirty,
                    updated,
                });
            },
        }
    }

    /// Mark every `updated` property as observed.
    pub fn clear_updated_flags(&mut self) {
        for property in self.properties.values_mut() {
            property.updated = false;
        }
    }
}

/// How the base client classified an incoming confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Another client's accepted write; applied to the mirror.
    RemoteUpdate,
    /// Our own write coming back; applied, and one in-flight send accounted
    /// for.
    EchoConfirmed,
    /// Another client's write raced one of ours that is still in flight.
    /// Dropped: our newer value is already on its way and would overwrite
    /// it anyway.
    ConflictDropped,
    /// A confirmation for an object we are not attached to.
    ObjectMismatch,
}

/// The sans-IO core of the client: the mirror, the per-property count of
/// in-flight local mutations, and the conflict statistics. All the
/// interesting classification logic lives here so it can be exercised
/// without a connection.
pub struct BaseCollabClient {
    client_id: ClientId,
    current_object: Option<TrackedObject>,
    unconfirmed: BTreeMap<(ObjectId, PropertyId), usize>,
    conflicts: u64,
}

impl BaseCollabClient {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::generate(),
            current_object: None,
            unconfirmed: BTreeMap::new(),
            conflicts: 0,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn current_object(&self) -> Option<&TrackedObject> {
        self.current_object.as_ref()
    }

    pub fn current_object_mut(&mut self) -> Option<&mut TrackedObject> {
        self.current_object.as_mut()
    }

    /// Take the mirror out for reconciliation; put it back with
    /// [`Self::stage_object`].
    pub fn take_object(&mut self) -> Option<TrackedObject> {
        self.current_object.take()
    }

    /// Number of local mutations awaiting their echo.
    pub fn unconfirmed_count(&self) -> usize {
        self.unconfirmed.values().sum()
    }

    pub fn conflict_count(&self) -> u64 {
        self.conflicts
    }

    /// Point the client at a new object. Unconfirmed counts from the
    /// previous object are meaningless and are discarded with it. Returns
    /// the subscribe-only frame to put on the wire.
    pub fn attach(&mut self, object_id: ObjectId) -> Mutation {
        self.current_object = Some(TrackedObject::new(object_id.clone()));
        self.unconfirmed.clear();
        Mutation::attach(object_id, self.client_id.clone())
    }

    /// After a transport reconnect: keep the mirror, forget the in-flight
    /// accounting (those sends died with the old stream), and re-announce
    /// interest in the current object.
    pub fn resend_attach(&mut self) -> Option<Mutation> {
        self.unconfirmed.clear();
        self.current_object
            .as_ref()
            .map(|object| Mutation::attach(object.object_id().clone(), self.client_id.clone()))
    }

    /// Install `object` as the mirror and take one mutation per dirty
    /// property, counting each as unconfirmed and clearing its dirty flag.
    pub fn stage_object(&mut self, object: TrackedObject) -> Vec<Mutation> {
        if self
            .current_object
            .as_ref()
            .is_some_and(|current| current.object_id() != object.object_id())
        {
            self.unconfirmed.clear();
        }
        let mut object = object;
        let object_id = object.object_id().clone();
        let mut mutations = Vec::new();
        for (property_id, property) in object.properties.iter_mut() {
            if !property.dirty {
                continue;
            }
            mutations.push(Mutation {
                object_id: object_id.clone(),
                property_id: property_id.clone(),
                data: property.data.clone(),
                origin_id: self.client_id.clone(),
            });
            *self
                .unconfirmed
                .entry((object_id.clone(), property_id.clone()))
                .or_insert(0) += 1;
            property.dirty = false;
        }
        self.current_object = Some(object);
        mutations
    }

    /// Classify one confirmation from the server and apply it to the
    /// mirror when appropriate.
    pub fn receive_confirmation(&mut self, confirmation: Confirmation) -> ReceiveOutcome {
        let Some(object) = &mut self.current_object else {
            return ReceiveOutcome::ObjectMismatch;
        };
        if *object.object_id() != confirmation.object_id {
            return ReceiveOutcome::ObjectMismatch;
        }

        let key = (
            confirmation.object_id.clone(),
            confirmation.property_id.clone(),
        );
        match self.unconfirmed.get_mut(&key) {
            // No local mutation outstanding for this property: a remote
            // update, applied as-is.
            None => {
                object.adjust_property(confirmation.property_id, confirmation.data, false, true);
                ReceiveOutcome::RemoteUpdate
            },
            // Our own echo: account for one in-flight send.
            Some(count) if confirmation.origin_id == self.client_id => {
                *count -= 1;
                if *count == 0 {
                    self.unconfirmed.remove(&key);
                }
                object.adjust_property(confirmation.property_id, confirmation.data, false, true);
                ReceiveOutcome::EchoConfirmed
            },
            // Someone else touched a property we still have in flight. Our
            // newer value will overwrite theirs; applying this one would
            // flap and then revert.
            Some(_) => {
                self.conflicts += 1;
                ReceiveOutcome::ConflictDropped
            },
        }
    }
}

impl Default for BaseCollabClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use sync_types::{
        Confirmation,
        ObjectId,
        PropertyId,
    };

    use super::{
        BaseCollabClient,
        ReceiveOutcome,
        TrackedObject,
    };

    fn confirmation(
        object_id: &str,
        property_id: &str,
        data: &'static [u8],
        origin: &str,
    ) -> Confirmation {
        Confirmation {
            object_id: object_id.parse().unwrap(),
            property_id: property_id.into(),
            data: Bytes::from_static(data),
            origin_id: origin.into(),
        }
    }

    fn attached_client(object_id: &str) -> BaseCollabClient {
        let mut base = BaseCollabClient::new();
        base.attach(object_id.parse().unwrap());
        base
    }

    #[test]
    fn test_adjust_property_detects_changes() {
        let object_id: ObjectId = "obj1".parse().unwrap();
        let mut object = TrackedObject::new(object_id);
        object.adjust_property("color".into(), Bytes::from_static(b"red"), true, false);
        assert!(object.properties()[&"color".into()].dirty);

        // Same bytes again: still whatever the flags were, not re-dirtied.
        let mut clean = object.clone();
        clean.properties.get_mut(&"color".into()).unwrap().dirty = false;
        clean.adjust_property("color".into(), Bytes::from_static(b"red"), true, false);
        assert!(!clean.properties()[&"color".into()].dirty);

        // New bytes flip the flags.
        clean.adjust_property("color".into(), Bytes::from_static(b"blue"), true, false);
        assert!(clean.properties()[&"color".into()].dirty);
    }

    #[test]
    fn test_stage_object_counts_dirty_properties() {
        let mut base = attached_client("obj1");
        let mut object = base.take_object().unwrap();
        object.adjust_property("color".into(), Bytes::from_static(b"red"), true, false);
        object.adjust_property("size".into(), Bytes::from_static(b"10"), true, false);
        object.adjust_property("stale".into(), Bytes::from_static(b"s"), false, false);

        let mutations = base.stage_object(object);
        assert_eq!(mutations.len(), 2);
        assert!(mutations.iter().all(|m| m.origin_id == *base.client_id()));
        assert_eq!(base.unconfirmed_count(), 2);

        // Dirty flags were consumed; staging again sends nothing.
        let object = base.take_object().unwrap();
        assert!(base.stage_object(object).is_empty());
        assert_eq!(base.unconfirmed_count(), 2);
    }

    #[test]
    fn test_remote_update_applies() {
        let mut base = attached_client("obj1");
        let outcome = base.receive_confirmation(confirmation("obj1", "x", b"1", "someone-else"));
        assert_eq!(outcome, ReceiveOutcome::RemoteUpdate);

        let object = base.current_object().unwrap();
        let property = &object.properties()[&"x".into()];
        assert_eq!(property.data, Bytes::from_static(b"1"));
        assert!(property.updated);
        assert!(!property.dirty);
    }

    #[test]
    fn test_echo_decrements_unconfirmed() {
        let mut base = attached_client("obj1");
        let client_id = base.client_id().clone();
        let mut object = base.take_object().unwrap();
        object.adjust_property("x".into(), Bytes::from_static(b"1"), true, false);
        let mutations = base.stage_object(object);
        assert_eq!(mutations.len(), 1);
        assert_eq!(base.unconfirmed_count(), 1);

        let outcome =
            base.receive_confirmation(confirmation("obj1", "x", b"1", client_id.as_str()));
        assert_eq!(outcome, ReceiveOutcome::EchoConfirmed);
        assert_eq!(base.unconfirmed_count(), 0);
        assert_eq!(base.conflict_count(), 0);
    }

    #[test]
    fn test_conflicting_remote_write_is_dropped() {
        // Scenario: we send x=1; before our echo arrives, someone else's
        // x=2 is confirmed. Their write is dropped, then our echo settles
        // the property at 1.
        let mut base = attached_client("obj1");
        let client_id = base.client_id().clone();
        let mut object = base.take_object().unwrap();
        object.adjust_property("x".into(), Bytes::from_static(b"1"), true, false);
        base.stage_object(object);

        let outcome = base.receive_confirmation(confirmation("obj1", "x", b"2", "client-b"));
        assert_eq!(outcome, ReceiveOutcome::ConflictDropped);
        assert_eq!(base.conflict_count(), 1);
        // The mirror still holds our value.
        assert_eq!(
            base.current_object().unwrap().properties()[&"x".into()].data,
            Bytes::from_static(b"1")
        );

        let outcome =
            base.receive_confirmation(confirmation("obj1", "x", b"1", client_id.as_str()));
        assert_eq!(outcome, ReceiveOutcome::EchoConfirmed);
        assert_eq!(base.unconfirmed_count(), 0);
        assert_eq!(
            base.current_object().unwrap().properties()[&"x".into()].data,
            Bytes::from_static(b"1")
        );
    }

    #[test]
    fn test_unrelated_property_is_not_a_conflict() {
        let mut base = attached_client("obj1");
        let mut object = base.take_object().unwrap();
        object.adjust_property("x".into(), Bytes::from_static(b"1"), true, false);
        base.stage_object(object);

        let outcome = base.receive_confirmation(confirmation("obj1", "y", b"2", "client-b"));
        assert_eq!(outcome, ReceiveOutcome::RemoteUpdate);
        assert_eq!(base.conflict_count(), 0);
    }

    #[test]
    fn test_object_mismatch() {
        let mut base = attached_client("obj1");
        let outcome = base.receive_confirmation(confirmation("obj2", "x", b"1", "client-b"));
        assert_eq!(outcome, ReceiveOutcome::ObjectMismatch);

        let mut unattached = BaseCollabClient::new();
        let outcome =
            unattached.receive_confirmation(confirmation("obj1", "x", b"1", "client-b"));
        assert_eq!(outcome, ReceiveOutcome::ObjectMismatch);
    }

    #[test]
    fn test_attach_resets_state() {
        let mut base = attached_client("obj1");
        let mut object = base.take_object().unwrap();
        object.adjust_property("x".into(), Bytes::from_static(b"1"), true, false);
        base.stage_object(object);
        assert_eq!(base.unconfirmed_count(), 1);

        let marker = base.attach("obj2".parse().unwrap());
        assert!(marker.property_id.is_attach_marker());
        assert_eq!(base.unconfirmed_count(), 0);
        assert_eq!(
            base.current_object().unwrap().object_id(),
            &"obj2".parse::<ObjectId>().unwrap()
        );
        assert!(base.current_object().unwrap().properties().is_empty());
    }

    #[test]
    fn test_clear_updated_flags() {
        let mut base = attached_client("obj1");
        base.receive_confirmation(confirmation("obj1", "x", b"1", "client-b"));
        let object = base.current_object_mut().unwrap();
        assert!(object.properties()[&PropertyId::from("x")].updated);
        object.clear_updated_flags();
        assert!(!object.properties()[&PropertyId::from("x")].updated);
    }
}
