//! Playable audio artifacts.
//!
//! An [`AudioArtifact`] is the handle the synthesis stage hands to the rest
//! of the system: pre-encoded audio bytes plus a content type, tagged with a
//! process-unique id.  Cloning is cheap (the payload is a shared
//! [`bytes::Bytes`]); dropping the last clone releases the payload.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

/// Monotonic id source for artifacts created in this process.
static NEXT_ARTIFACT_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// AudioArtifact
// ---------------------------------------------------------------------------

/// A resolved, playable audio resource produced by the synthesis stage.
///
/// Artifacts are transient and session-scoped: nothing is persisted, and the
/// encoded payload lives only as long as some clone of the handle does.
/// Equality compares the id, not the bytes — two artifacts synthesized from
/// identical input are still distinct resources.
#[derive(Clone)]
pub struct AudioArtifact {
    id: u64,
    content_type: String,
    payload: Bytes,
}

impl AudioArtifact {
    /// Wrap an encoded audio payload in a fresh artifact handle.
    pub fn new(payload: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            id: NEXT_ARTIFACT_ID.fetch_add(1, Ordering::Relaxed),
            content_type: content_type.into(),
            payload,
        }
    }

    /// Process-unique id of this artifact.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// MIME content type reported by the synthesis service
    /// (e.g. `audio/mpeg`).
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The encoded audio payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl PartialEq for AudioArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AudioArtifact {}

impl std::fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("len", &self.payload.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
