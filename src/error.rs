//! Typed outcomes for store mutations and acquisition failures.

use std::fmt;

/// Synchronous failure of a single-item library/playlist operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Lookup or dedup miss.
    NotFound,
    /// Create/rename target name already taken.
    DuplicateName,
    /// Attempt to rename or delete the protected playlist.
    ProtectedName,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::DuplicateName => write!(f, "a playlist with this name already exists"),
            StoreError::ProtectedName => write!(f, "the 'All songs' playlist cannot be modified"),
        }
    }
}

/// Pipeline step an acquisition failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStage {
    Catalog,
    Cover,
    Audio,
    Lyrics,
}

impl fmt::Display for AcquisitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStage::Catalog => write!(f, "catalog"),
            AcquisitionStage::Cover => write!(f, "cover"),
            AcquisitionStage::Audio => write!(f, "audio"),
            AcquisitionStage::Lyrics => write!(f, "lyrics"),
        }
    }
}

/// Failure of one acquisition pipeline item.
///
/// Cover and lyrics failures degrade inside the pipeline and never surface as
/// this type; only the audio step is fatal for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionError {
    pub stage: AcquisitionStage,
    pub message: String,
}

impl AcquisitionError {
    pub fn new(stage: AcquisitionStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step failed: {}", self.stage, self.message)
    }
}
