//! Keyspace layout.

use crate::domain::StateError;

const OBJECT: &str = "o";
const INDEX: &str = "i";
const LINK: &str = "l";

/// One buffered write of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl StateUpdate {
    pub fn key(&self) -> &str {
        match self {
            StateUpdate::Put { key, .. } | StateUpdate::Delete { key } => key,
        }
    }
}

pub fn object_key(kind: &str, id: &str) -> Result<String, StateError> {
    check_segment(kind)?;
    check_segment(id)?;
    Ok(format!("{OBJECT}/{kind}/{id}"))
}

/// Prefix covering every object of `kind`.
pub fn object_prefix(kind: &str) -> Result<String, StateError> {
    check_segment(kind)?;
    Ok(format!("{OBJECT}/{kind}/"))
}

pub fn index_key(kind: &str, index: &str, value: &str) -> Result<String, StateError> {
    check_segment(kind)?;
    check_segment(index)?;
    check_segment(value)?;
    Ok(format!("{INDEX}/{kind}/{index}/{value}"))
}

pub fn link_key(from: &str, name: &str) -> Result<String, StateError> {
    check_segment(from)?;
    check_segment(name)?;
    Ok(format!("{LINK}/{from}/{name}"))
}

fn check_segment(segment: &str) -> Result<(), StateError> {
    if segment.is_empty() {
        return Err(StateError::InvalidKey("empty key segment".into()));
    }
    if segment.contains('/') {
        return Err(StateError::InvalidKey(format!(
            "segment '{segment}' contains '/'"
        )));
    }
    Ok(())
}
