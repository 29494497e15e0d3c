//! Storage collaborator interface consumed by the dispatch pipeline.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::keys::{index_key, link_key, object_key};
use crate::domain::{StateError, StateUpdate};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxMode {
    ReadOnly,
    ReadWrite,
}

/// Opens transactions against the backing engine.
pub trait StateStore: Send + Sync {
    fn begin(&self, mode: TrxMode) -> Result<Box<dyn Trx>, StateError>;
}

/// A scoped handle to the store.
///
/// Every transaction is closed exactly once, through [`Trx::commit`] or
/// [`Trx::discard`]. Both consume the box, so a closed handle cannot be
/// reused.
pub trait Trx: Send {
    fn mode(&self) -> TrxMode;

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StateError>;
    fn put_bytes(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError>;
    fn delete(&mut self, key: &str) -> Result<(), StateError>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order,
    /// including this transaction's own uncommitted writes.
    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StateError>;

    /// Writes buffered so far, in key order.
    fn updates(&self) -> Vec<StateUpdate>;

    fn commit(self: Box<Self>) -> Result<(), StateError>;
    fn discard(self: Box<Self>);

    fn is_read_only(&self) -> bool {
        self.mode() == TrxMode::ReadOnly
    }

    fn get_object(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StateError> {
        match self.get_bytes(&object_key(kind, id)?)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_object(
        &mut self,
        kind: &str,
        id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(fields)?;
        self.put_bytes(&object_key(kind, id)?, bytes)
    }

    fn delete_object(&mut self, kind: &str, id: &str) -> Result<(), StateError> {
        self.delete(&object_key(kind, id)?)
    }

    fn get_index(&self, kind: &str, index: &str, value: &str) -> Result<Option<String>, StateError> {
        self.get_bytes(&index_key(kind, index, value)?)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| StateError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    fn put_index(&mut self, kind: &str, index: &str, value: &str, id: &str) -> Result<(), StateError> {
        self.put_bytes(&index_key(kind, index, value)?, id.as_bytes().to_vec())
    }

    fn del_index(&mut self, kind: &str, index: &str, value: &str) -> Result<(), StateError> {
        self.delete(&index_key(kind, index, value)?)
    }

    fn has_index(&self, kind: &str, index: &str, value: &str) -> Result<bool, StateError> {
        Ok(self.get_bytes(&index_key(kind, index, value)?)?.is_some())
    }

    fn get_link(&self, from: &str, name: &str) -> Result<Option<String>, StateError> {
        self.get_bytes(&link_key(from, name)?)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| StateError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    fn put_link(&mut self, from: &str, name: &str, to: &str) -> Result<(), StateError> {
        self.put_bytes(&link_key(from, name)?, to.as_bytes().to_vec())
    }
}

/// Typed object access on top of [`Trx`].
pub trait TrxExt {
    fn load<V: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<Option<V>, StateError>;
    fn store<V: Serialize>(&mut self, kind: &str, id: &str, value: &V) -> Result<(), StateError>;

    /// Like [`TrxExt::load`] but a missing object is an error.
    fn require<V: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<V, StateError> {
        self.load(kind, id)?.ok_or_else(|| StateError::ObjectNotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        })
    }
}

impl<T: Trx + ?Sized> TrxExt for T {
    fn load<V: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<Option<V>, StateError> {
        match self.get_object(kind, id)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn store<V: Serialize>(&mut self, kind: &str, id: &str, value: &V) -> Result<(), StateError> {
        let fields = serde_json::to_value(value)?;
        self.put_object(kind, id, &fields)
    }
}
