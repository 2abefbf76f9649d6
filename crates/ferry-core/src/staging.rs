//! Staging area: local copies of artifacts waiting for upload.
//!
//! The producer may change or delete its file right after submitting it, so
//! every artifact is copied under a fresh ULID name before it is queued.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use ulid::Ulid;

use crate::error::{FerryError, Result};

#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    /// Set when the directory was created by us and must be removed on release.
    owned: Option<TempDir>,
}

impl StagingArea {
    /// Use `dir` if given, otherwise create an owned temporary directory.
    pub async fn new(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| FerryError::Staging {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                Ok(Self {
                    dir: dir.to_path_buf(),
                    owned: None,
                })
            }
            None => {
                let tmp = tokio::task::spawn_blocking(|| {
                    tempfile::Builder::new().prefix("ferry-staging-").tempdir()
                })
                .await
                .map_err(std::io::Error::from)??;
                Ok(Self {
                    dir: tmp.path().to_path_buf(),
                    owned: Some(tmp),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Copy `artifact` to a new, uniquely named file and return its path.
    pub async fn stage(&self, artifact: &Path) -> Result<PathBuf> {
        let staged = self.dir.join(Ulid::new().to_string());
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FerryError::Staging {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::copy(artifact, &staged)
            .await
            .map_err(|source| FerryError::Staging {
                path: artifact.to_path_buf(),
                source,
            })?;
        Ok(staged)
    }

    /// Remove the directory if it is owned; a caller-provided directory is left alone.
    ///
    /// Dropping an owned area without calling this still removes the
    /// directory, but synchronously and ignoring errors.
    pub async fn release(self) -> Result<()> {
        if let Some(tmp) = self.owned {
            tokio::task::spawn_blocking(move || tmp.close())
                .await
                .map_err(std::io::Error::from)??;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_copy_outlives_original() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("metrics.json");
        tokio::fs::write(&original, b"{\"loss\": 0.1}").await.unwrap();

        let staging = StagingArea::new(Some(dir.path().join("stage").as_path()))
            .await
            .unwrap();
        let staged = staging.stage(&original).await.unwrap();
        tokio::fs::remove_file(&original).await.unwrap();

        assert!(staged.starts_with(staging.path()));
        assert_eq!(tokio::fs::read(&staged).await.unwrap(), b"{\"loss\": 0.1}");
    }

    #[tokio::test]
    async fn staged_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("a.txt");
        tokio::fs::write(&original, b"a").await.unwrap();

        let staging = StagingArea::new(Some(dir.path())).await.unwrap();
        let one = staging.stage(&original).await.unwrap();
        let two = staging.stage(&original).await.unwrap();
        assert_ne!(one, two);
    }

    #[tokio::test]
    async fn missing_artifact_is_a_staging_error() {
        let staging = StagingArea::new(None).await.unwrap();
        let err = staging.stage(Path::new("/no/such/file")).await.unwrap_err();
        assert!(matches!(err, FerryError::Staging { .. }));
    }

    #[tokio::test]
    async fn owned_directory_is_removed_on_release() {
        let staging = StagingArea::new(None).await.unwrap();
        let path = staging.path().to_path_buf();
        assert!(staging.is_owned());
        assert!(path.exists());
        staging.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn provided_directory_is_kept_on_release() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::new(Some(dir.path())).await.unwrap();
        assert!(!staging.is_owned());
        staging.release().await.unwrap();
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn dropping_an_owned_area_removes_it() {
        let staging = StagingArea::new(None).await.unwrap();
        let path = staging.path().to_path_buf();
        drop(staging);
        assert!(!path.exists());
    }
}
