use shared_types::{GroupId, UserId};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::ports::SignalSink;

/// A listener bound to a whole group rather than a single member.
#[derive(Clone)]
pub struct BoundListener {
    pub sink: Arc<dyn SignalSink>,
    /// When set, the bound listener replaces per-member fan-out.
    pub override_existing: bool,
}

/// A named set of subjects.
#[derive(Clone)]
pub struct Group {
    pub id: GroupId,
    pub members: BTreeSet<UserId>,
    pub bound: Option<BoundListener>,
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: BTreeSet::new(),
            bound: None,
        }
    }
}
