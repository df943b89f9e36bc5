//! Request identity and the dispatch envelope.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::wire::{self, WireError};

/// Identifies one client request and where its answer must be routed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metadata {
    pub request_id: String,
    pub return_host: String,
    pub return_port: u16,
}

impl Metadata {
    pub fn new(request_id: impl Into<String>, return_host: impl Into<String>, return_port: u16) -> Self {
        Self {
            request_id: request_id.into(),
            return_host: return_host.into(),
            return_port,
        }
    }
}

/// A client request paired with its opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub metadata: Metadata,
    pub payload: Vec<u8>,
}

impl WorkUnit {
    pub fn new(metadata: Metadata, payload: Vec<u8>) -> Self {
        Self { metadata, payload }
    }

    pub fn request_id(&self) -> &str {
        &self.metadata.request_id
    }
}

/// An admitted unit, shared between the group's `live` slot, its backlog and
/// every worker racing it.
///
/// Equality is identity: two `SharedUnit`s are equal only when they are the
/// same admission, so a resubmitted request id never matches a stale one.
/// The dispatch frame is encoded once at admission and reused for every
/// worker the unit is sent to.
#[derive(Clone)]
pub struct SharedUnit(Arc<StagedUnit>);

struct StagedUnit {
    unit: WorkUnit,
    frame: Bytes,
}

impl SharedUnit {
    /// Encode the dispatch frame for `filter` and wrap the unit for sharing
    pub fn stage(unit: WorkUnit, filter: &str) -> Result<Self, WireError> {
        let frame = wire::encode_dispatch(&unit, filter)?;
        Ok(Self(Arc::new(StagedUnit { unit, frame })))
    }

    pub fn metadata(&self) -> &Metadata {
        &self.0.unit.metadata
    }

    pub fn request_id(&self) -> &str {
        self.0.unit.request_id()
    }

    /// Encoded dispatch frame; cloning is a reference-count bump
    pub fn frame(&self) -> Bytes {
        self.0.frame.clone()
    }
}

impl PartialEq for SharedUnit {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SharedUnit {}

impl fmt::Debug for SharedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedUnit")
            .field("request_id", &self.request_id())
            .field("payload_len", &self.0.unit.payload.len())
            .finish()
    }
}
