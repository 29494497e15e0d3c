//! # Signaler
//!
//! Registry of per-subject listeners and named groups.

use bytes::Bytes;
use parking_lot::RwLock;
use px_telemetry::{SIGNALS_DELIVERED, SIGNAL_FAILURES};
use shared_types::{GroupId, UserId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tracing::{debug, warn};

use crate::domain::{
    BoundListener, DeliveryReport, Group, Listener, SignalEnvelope, SignalError, SignalMessage,
};
use crate::ports::{FederationRelay, JoinObserver, SignalPort, SignalSink};

/// Listener and group registry with fan-out.
///
/// Ordered maps back both registries so prefix lookups
/// (`tenant/`, `tenant/room-`) cost time proportional to the matching range.
pub struct Signaler {
    /// Origin name of this node; subjects with another `@origin` are remote.
    origin: String,
    listeners: RwLock<BTreeMap<UserId, Listener>>,
    groups: RwLock<BTreeMap<GroupId, Group>>,
    /// When set, receives every group signal instead of the members.
    global_bridge: RwLock<Option<Arc<dyn SignalSink>>>,
    federation: Option<Arc<dyn FederationRelay>>,
    join_observer: Option<Arc<dyn JoinObserver>>,
}

impl Signaler {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            listeners: RwLock::new(BTreeMap::new()),
            groups: RwLock::new(BTreeMap::new()),
            global_bridge: RwLock::new(None),
            federation: None,
            join_observer: None,
        }
    }

    pub fn with_federation(mut self, relay: Arc<dyn FederationRelay>) -> Self {
        self.federation = Some(relay);
        self
    }

    pub fn with_join_observer(mut self, observer: Arc<dyn JoinObserver>) -> Self {
        self.join_observer = Some(observer);
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    /// Register or replace the listener for `listener.id`.
    ///
    /// Returns the listener that was replaced, if any.
    pub fn listen_single(&self, listener: Listener) -> Option<Listener> {
        let id = listener.id.clone();
        let replaced = self.listeners.write().insert(id.clone(), listener);
        debug!(listener = %id, replaced = replaced.is_some(), "Listener registered");
        replaced
    }

    pub fn remove_listener(&self, id: &UserId) -> Option<Listener> {
        let removed = self.listeners.write().remove(id);
        if removed.is_some() {
            debug!(listener = %id, "Listener removed");
        }
        removed
    }

    pub fn has_listener(&self, id: &UserId) -> bool {
        self.listeners.read().contains_key(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Mark a listener as disconnected but keep it registered.
    pub fn pause_listener(&self, id: &UserId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(listener) = listeners.get_mut(id) else {
            return false;
        };
        listener.paused = true;
        listener.last_disconnect = Some(Instant::now());
        debug!(listener = %id, "Listener paused");
        true
    }

    pub fn resume_listener(&self, id: &UserId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(listener) = listeners.get_mut(id) else {
            return false;
        };
        listener.paused = false;
        debug!(listener = %id, "Listener resumed");
        true
    }

    /// Remove listeners that have been paused for at least `older_than`.
    pub fn prune_disconnected(&self, older_than: Duration) -> Vec<UserId> {
        let mut removed = Vec::new();
        self.listeners.write().retain(|id, listener| {
            let stale = listener.paused
                && listener
                    .last_disconnect
                    .is_some_and(|at| at.elapsed() >= older_than);
            if stale {
                removed.push(id.clone());
            }
            !stale
        });
        if !removed.is_empty() {
            debug!(count = removed.len(), "Pruned disconnected listeners");
        }
        removed
    }

    /// Listener ids starting with `prefix`, in order.
    pub fn listeners_with_prefix(&self, prefix: &str) -> Vec<UserId> {
        let listeners = self.listeners.read();
        listeners
            .range(UserId::new(prefix)..)
            .take_while(|(id, _)| id.as_str().starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect()
    }

    // =========================================================================
    // GROUPS
    // =========================================================================

    /// Create `group` if it does not exist yet.
    pub fn ensure_group(&self, group: &GroupId) {
        self.groups
            .write()
            .entry(group.clone())
            .or_insert_with(|| Group::new(group.clone()));
    }

    /// Add `user` to `group`, creating the group on first join.
    ///
    /// Returns `false` when the user was already a member.
    pub fn join_group(&self, group: &GroupId, user: UserId) -> bool {
        let joined = {
            let mut groups = self.groups.write();
            groups
                .entry(group.clone())
                .or_insert_with(|| Group::new(group.clone()))
                .members
                .insert(user.clone())
        };

        if joined {
            debug!(group_id = %group, user = %user, "Joined group");
            if let Some(observer) = &self.join_observer {
                observer.on_join(group, &user);
            }
        }
        joined
    }

    pub fn leave_group(&self, group: &GroupId, user: &UserId) -> bool {
        let left = {
            let mut groups = self.groups.write();
            groups
                .get_mut(group)
                .is_some_and(|g| g.members.remove(user))
        };

        if left {
            debug!(group_id = %group, user = %user, "Left group");
            if let Some(observer) = &self.join_observer {
                observer.on_leave(group, user);
            }
        }
        left
    }

    pub fn remove_group(&self, group: &GroupId) -> bool {
        self.groups.write().remove(group).is_some()
    }

    pub fn members(&self, group: &GroupId) -> Vec<UserId> {
        self.groups
            .read()
            .get(group)
            .map(|g| g.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, group: &GroupId, user: &UserId) -> bool {
        self.groups
            .read()
            .get(group)
            .is_some_and(|g| g.members.contains(user))
    }

    /// Group ids starting with `prefix`, in order.
    pub fn groups_with_prefix(&self, prefix: &str) -> Vec<GroupId> {
        let groups = self.groups.read();
        groups
            .range(GroupId::new(prefix)..)
            .take_while(|(id, _)| id.as_str().starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Bind a listener to the whole group.
    ///
    /// With `override_existing` the bound listener receives group signals
    /// instead of the members; without it, in addition to them.
    pub fn bind_group_listener(
        &self,
        group: &GroupId,
        sink: Arc<dyn SignalSink>,
        override_existing: bool,
    ) {
        let mut groups = self.groups.write();
        groups
            .entry(group.clone())
            .or_insert_with(|| Group::new(group.clone()))
            .bound = Some(BoundListener {
            sink,
            override_existing,
        });
        debug!(group_id = %group, override_existing, "Group listener bound");
    }

    pub fn unbind_group_listener(&self, group: &GroupId) -> bool {
        self.groups
            .write()
            .get_mut(group)
            .and_then(|g| g.bound.take())
            .is_some()
    }

    /// Route every group signal to `bridge`, or restore fan-out with `None`.
    pub fn set_global_bridge(&self, bridge: Option<Arc<dyn SignalSink>>) {
        *self.global_bridge.write() = bridge;
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Deliver `payload` to a single subject.
    ///
    /// An unregistered or paused subject is not an error; it is offline and
    /// the call returns `Ok(false)`.
    pub fn signal_user(
        &self,
        key: &str,
        user: &UserId,
        payload: &serde_json::Value,
    ) -> Result<bool, SignalError> {
        let bytes = encode_raw(payload)?;

        if let Some(origin) = user.origin().filter(|o| *o != self.origin) {
            let Some(relay) = &self.federation else {
                debug!(user = %user, origin, "No federation relay, dropping remote signal");
                return Ok(false);
            };
            relay.relay_to_user(origin, key, user, bytes)?;
            return Ok(true);
        }

        let listener = self.listeners.read().get(user).cloned();
        match listener {
            None => {
                debug!(key, user = %user, "Subject offline, signal dropped");
                Ok(false)
            }
            Some(listener) if listener.paused => Ok(false),
            Some(listener) => {
                let message = SignalMessage::new(key, bytes);
                deliver_isolated(user.as_str(), || listener.signal(&message))?;
                Ok(true)
            }
        }
    }

    /// Deliver `payload` to every current member of `group` except those
    /// listed in `exceptions`.
    ///
    /// With `pack` the payload is wrapped in a [`SignalEnvelope`]; without it
    /// the payload is sent as-is (JSON strings as their raw text).
    pub fn signal_group(
        &self,
        key: &str,
        group: &GroupId,
        payload: &serde_json::Value,
        pack: bool,
        exceptions: &[UserId],
    ) -> Result<DeliveryReport, SignalError> {
        let bytes = if pack {
            Bytes::from(serde_json::to_vec(&SignalEnvelope::new(
                key,
                group,
                payload.clone(),
            ))?)
        } else {
            encode_raw(payload)?
        };
        let message = SignalMessage::new(key, bytes);
        let mut report = DeliveryReport::default();

        let bridge = self.global_bridge.read().clone();
        if let Some(bridge) = bridge {
            record(&mut report, deliver_isolated("global-bridge", || bridge.deliver(&message)));
            return Ok(report);
        }

        let snapshot = self
            .groups
            .read()
            .get(group)
            .map(|g| (g.members.clone(), g.bound.clone()));
        let Some((members, bound)) = snapshot else {
            debug!(key, group_id = %group, "Signal to unknown group dropped");
            return Ok(report);
        };

        if let Some(bound) = bound {
            record(
                &mut report,
                deliver_isolated(group.as_str(), || bound.sink.deliver(&message)),
            );
            if bound.override_existing {
                return Ok(report);
            }
        }

        let excluded: HashSet<&UserId> = exceptions.iter().collect();
        let mut remote: BTreeMap<String, BTreeSet<UserId>> = BTreeMap::new();
        let mut local: Vec<(UserId, Option<Listener>)> = Vec::with_capacity(members.len());

        {
            let listeners = self.listeners.read();
            for member in members {
                if excluded.contains(&member) {
                    report.excepted += 1;
                    continue;
                }
                match member.origin().filter(|o| *o != self.origin) {
                    Some(origin) => {
                        remote.entry(origin.to_string()).or_default().insert(member);
                    }
                    None => {
                        let listener = listeners.get(&member).cloned();
                        local.push((member, listener));
                    }
                }
            }
        }

        for (member, listener) in local {
            match listener {
                None => report.offline += 1,
                Some(listener) if listener.paused => report.paused += 1,
                Some(listener) => record(
                    &mut report,
                    deliver_isolated(member.as_str(), || listener.signal(&message)),
                ),
            }
        }

        if !remote.is_empty() {
            self.relay_group(key, group, &message.payload, exceptions, remote, &mut report);
        }

        debug!(
            key,
            group_id = %group,
            delivered = report.delivered,
            excepted = report.excepted,
            offline = report.offline,
            failed = report.failed,
            "Group signal delivered"
        );
        Ok(report)
    }

    fn relay_group(
        &self,
        key: &str,
        group: &GroupId,
        payload: &Bytes,
        exceptions: &[UserId],
        remote: BTreeMap<String, BTreeSet<UserId>>,
        report: &mut DeliveryReport,
    ) {
        let Some(relay) = &self.federation else {
            debug!(
                group_id = %group,
                origins = remote.len(),
                "No federation relay, remote members skipped"
            );
            report.offline += remote.values().map(BTreeSet::len).sum::<usize>();
            return;
        };

        for origin in remote.into_keys() {
            match relay.relay_to_group(&origin, key, group, payload.clone(), exceptions) {
                Ok(()) => report.relayed.push(origin),
                Err(e) => {
                    warn!(group_id = %group, origin = %origin, error = %e, "Federation relay failed");
                    report.failed += 1;
                }
            }
        }
    }
}

impl SignalPort for Signaler {
    fn signal_user(
        &self,
        key: &str,
        user: &UserId,
        payload: &serde_json::Value,
    ) -> Result<bool, SignalError> {
        Signaler::signal_user(self, key, user, payload)
    }

    fn signal_group(
        &self,
        key: &str,
        group: &GroupId,
        payload: &serde_json::Value,
        pack: bool,
        exceptions: &[UserId],
    ) -> Result<DeliveryReport, SignalError> {
        Signaler::signal_group(self, key, group, payload, pack, exceptions)
    }
}

/// JSON strings go out as their raw text, everything else as JSON.
fn encode_raw(payload: &serde_json::Value) -> Result<Bytes, SignalError> {
    match payload {
        serde_json::Value::String(text) => Ok(Bytes::from(text.clone().into_bytes())),
        other => Ok(Bytes::from(serde_json::to_vec(other)?)),
    }
}

/// Run one delivery so that neither an error nor a panic escapes it.
fn deliver_isolated<F>(recipient: &str, deliver: F) -> Result<(), SignalError>
where
    F: FnOnce() -> Result<(), SignalError>,
{
    let outcome = match catch_unwind(AssertUnwindSafe(deliver)) {
        Ok(result) => result,
        Err(_) => Err(SignalError::ListenerPanicked),
    };

    match &outcome {
        Ok(()) => SIGNALS_DELIVERED.inc(),
        Err(e) => {
            SIGNAL_FAILURES.inc();
            warn!(recipient, error = %e, "Signal delivery failed");
        }
    }
    outcome
}

fn record(report: &mut DeliveryReport, outcome: Result<(), SignalError>) {
    match outcome {
        Ok(()) => report.delivered += 1,
        Err(_) => report.failed += 1,
    }
}
