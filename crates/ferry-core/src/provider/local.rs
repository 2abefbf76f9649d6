//! LocalObjectStore - ローカルディレクトリを使ったオブジェクトストア
//!
//! Objects live at `<root>/<container>/<object_name>`. Writes go to a temporary
//! sibling first and are renamed into place, so a reader never sees a partial
//! object.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use ulid::Ulid;

use super::{ObjectStore, ProviderError, ProviderFactory};

const PROVIDER_NAME: &str = "file";

pub struct LocalObjectStore {
    container: String,
    container_dir: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        let container = container.into();
        let container_dir = root.into().join(&container);
        Self {
            container,
            container_dir,
        }
    }

    /// Map an object name to a path inside the container directory.
    ///
    /// Names that would escape the container (`..`, absolute components) are
    /// rejected as permanent errors.
    fn object_path(&self, object_name: &str) -> Result<PathBuf, ProviderError> {
        let relative = Path::new(object_name.trim_start_matches('/'));
        let mut path = self.container_dir.clone();
        let mut pushed = false;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                _ => {
                    return Err(ProviderError::Permanent(format!(
                        "invalid object name: {object_name}"
                    )));
                }
            }
        }
        if !pushed {
            return Err(ProviderError::Permanent(format!(
                "invalid object name: {object_name:?}"
            )));
        }
        Ok(path)
    }

    async fn prepare(&self, object_name: &str) -> Result<(PathBuf, PathBuf), ProviderError> {
        let target = self.object_path(object_name)?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.container_dir.clone());
        tokio::fs::create_dir_all(&parent).await?;
        let partial = parent.join(format!(".{}.partial", Ulid::new()));
        Ok((target, partial))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn container_name(&self) -> &str {
        &self.container
    }

    async fn upload(&self, local_path: &Path, object_name: &str) -> Result<(), ProviderError> {
        let (target, partial) = self.prepare(object_name).await?;
        if let Err(e) = tokio::fs::copy(local_path, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tokio::fs::rename(&partial, &target).await?;
        Ok(())
    }

    async fn upload_bytes(&self, data: Bytes, object_name: &str) -> Result<(), ProviderError> {
        let (target, partial) = self.prepare(object_name).await?;
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(())
    }

    async fn object_size(&self, object_name: &str) -> Result<u64, ProviderError> {
        let path = self.object_path(object_name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(ProviderError::NotFound(object_name.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ProviderError::NotFound(object_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Factory for [`LocalObjectStore`] handles sharing one root directory.
#[derive(Debug, Clone)]
pub struct LocalStoreFactory {
    root: PathBuf,
    container: String,
}

impl LocalStoreFactory {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
        }
    }
}

impl ProviderFactory for LocalStoreFactory {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn container_name(&self) -> &str {
        &self.container
    }

    fn connect(&self) -> Result<Box<dyn ObjectStore>, ProviderError> {
        Ok(Box::new(LocalObjectStore::new(
            self.root.clone(),
            self.container.clone(),
        )))
    }
}
