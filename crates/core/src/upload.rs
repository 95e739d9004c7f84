//! Upload saga state machine.
//!
//! An upload writes the blob first and the metadata record second. When the
//! second step fails the blob is deleted again. The saga tracks which step
//! has completed so the service, and its cancellation guard, know whether a
//! compensating delete is owed.

use crate::blob::BlobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of an upload saga.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// Payload is being streamed into the blob store.
    BlobPending,
    /// Blob committed; no record yet.
    BlobWritten,
    /// Record inserted. Terminal success.
    MetaWritten,
    /// Record insert failed; compensation owed.
    MetaFailed,
    /// Compensating blob delete in progress.
    Compensating,
    /// Blob removed after a metadata failure.
    Compensated,
    /// Blob write failed; nothing to undo.
    BlobFailed,
    /// Compensating delete failed; the blob is orphaned.
    CompensationFailed,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlobPending => "blob_pending",
            Self::BlobWritten => "blob_written",
            Self::MetaWritten => "meta_written",
            Self::MetaFailed => "meta_failed",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
            Self::BlobFailed => "blob_failed",
            Self::CompensationFailed => "compensation_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MetaWritten | Self::Compensated | Self::BlobFailed | Self::CompensationFailed
        )
    }

    /// Whether a committed blob has to be undone if the upload stops here. In
    /// `BlobWritten` a record insert may still be in flight, so undoing
    /// covers the record too.
    pub fn owes_compensation(&self) -> bool {
        matches!(self, Self::BlobWritten | Self::MetaFailed)
    }

    fn can_transition_to(&self, next: UploadPhase) -> bool {
        use UploadPhase::*;
        matches!(
            (self, next),
            (BlobPending, BlobWritten)
                | (BlobPending, BlobFailed)
                | (BlobWritten, MetaWritten)
                | (BlobWritten, MetaFailed)
                // cancellation between the two writes
                | (BlobWritten, Compensating)
                | (MetaFailed, Compensating)
                | (Compensating, Compensated)
                | (Compensating, CompensationFailed)
        )
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one upload through the blob and metadata writes.
#[derive(Clone, Debug)]
pub struct UploadSaga {
    phase: UploadPhase,
    blob_id: Option<BlobId>,
}

impl UploadSaga {
    pub fn new() -> Self {
        Self {
            phase: UploadPhase::BlobPending,
            blob_id: None,
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Blob id, once the blob has been committed.
    pub fn blob_id(&self) -> Option<BlobId> {
        self.blob_id
    }

    pub fn blob_written(&mut self, blob_id: BlobId) -> crate::Result<()> {
        self.advance(UploadPhase::BlobWritten)?;
        self.blob_id = Some(blob_id);
        Ok(())
    }

    pub fn blob_failed(&mut self) -> crate::Result<()> {
        self.advance(UploadPhase::BlobFailed)
    }

    pub fn meta_written(&mut self) -> crate::Result<()> {
        self.advance(UploadPhase::MetaWritten)
    }

    pub fn meta_failed(&mut self) -> crate::Result<()> {
        self.advance(UploadPhase::MetaFailed)
    }

    /// Enter compensation and return the blob that must be deleted.
    pub fn begin_compensation(&mut self) -> crate::Result<BlobId> {
        let blob_id = self.blob_id.ok_or_else(|| self.rejected(UploadPhase::Compensating))?;
        self.advance(UploadPhase::Compensating)?;
        Ok(blob_id)
    }

    pub fn compensated(&mut self) -> crate::Result<()> {
        self.advance(UploadPhase::Compensated)
    }

    pub fn compensation_failed(&mut self) -> crate::Result<()> {
        self.advance(UploadPhase::CompensationFailed)
    }

    fn advance(&mut self, next: UploadPhase) -> crate::Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(self.rejected(next));
        }
        self.phase = next;
        Ok(())
    }

    fn rejected(&self, next: UploadPhase) -> crate::Error {
        crate::Error::InvalidTransition {
            from: self.phase.to_string(),
            to: next.to_string(),
        }
    }
}

impl Default for UploadSaga {
    fn default() -> Self {
        Self::new()
    }
}
