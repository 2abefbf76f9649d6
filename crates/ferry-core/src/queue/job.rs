//! Upload job: the unit of work carried through the queue.

use std::fmt;
use std::path::{Path, PathBuf};

use ulid::Ulid;

/// Identifier of an upload job (`job-<ulid>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Ulid);

impl JobId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// A staged file waiting to be uploaded as `object_name`.
///
/// Immutable once created; the queue hands each job to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    id: JobId,
    staged_path: PathBuf,
    object_name: String,
    overwrite: bool,
}

impl UploadJob {
    pub fn new(staged_path: impl Into<PathBuf>, object_name: impl Into<String>, overwrite: bool) -> Self {
        Self {
            id: JobId::new(),
            staged_path: staged_path.into(),
            object_name: object_name.into(),
            overwrite,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }
}
