//! Test doubles: a scripted object store that records every call.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::provider::{ObjectStore, ProviderError, ProviderFactory};

#[derive(Default)]
struct Shared {
    /// object name -> uploaded bytes
    objects: HashMap<String, Vec<u8>>,
    /// Every upload call, in order (including failed ones).
    upload_calls: Vec<String>,
    /// Errors returned by the next uploads of an object, front first.
    upload_failures: HashMap<String, VecDeque<ProviderError>>,
    /// Errors returned by the next `object_size` calls of an object.
    size_failures: HashMap<String, VecDeque<ProviderError>>,
    connects: usize,
}

/// Shared state behind every handle produced by [`ScriptedFactory`].
#[derive(Clone, Default)]
pub(crate) struct ScriptedStore {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_object(&self, name: &str, data: &[u8]) {
        let mut shared = self.shared.lock().unwrap();
        shared.objects.insert(name.to_string(), data.to_vec());
    }

    pub(crate) fn fail_uploads(&self, name: &str, errors: impl IntoIterator<Item = ProviderError>) {
        let mut shared = self.shared.lock().unwrap();
        shared
            .upload_failures
            .entry(name.to_string())
            .or_default()
            .extend(errors);
    }

    pub(crate) fn fail_size_checks(&self, name: &str, errors: impl IntoIterator<Item = ProviderError>) {
        let mut shared = self.shared.lock().unwrap();
        shared
            .size_failures
            .entry(name.to_string())
            .or_default()
            .extend(errors);
    }

    pub(crate) fn upload_calls(&self) -> Vec<String> {
        self.shared.lock().unwrap().upload_calls.clone()
    }

    pub(crate) fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.shared.lock().unwrap().objects.get(name).cloned()
    }

    pub(crate) fn connects(&self) -> usize {
        self.shared.lock().unwrap().connects
    }

    pub(crate) fn factory(&self) -> ScriptedFactory {
        ScriptedFactory {
            store: self.clone(),
        }
    }

    fn next_upload_failure(&self, name: &str) -> Option<ProviderError> {
        let mut shared = self.shared.lock().unwrap();
        shared.upload_calls.push(name.to_string());
        shared
            .upload_failures
            .get_mut(name)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn container_name(&self) -> &str {
        "bucket"
    }

    async fn upload(&self, local_path: &Path, object_name: &str) -> Result<(), ProviderError> {
        if let Some(err) = self.next_upload_failure(object_name) {
            return Err(err);
        }
        // Paths that do not exist are fine for retry tests that never stage.
        let data = tokio::fs::read(local_path).await.unwrap_or_default();
        self.insert_object(object_name, &data);
        Ok(())
    }

    async fn upload_bytes(&self, data: Bytes, object_name: &str) -> Result<(), ProviderError> {
        if let Some(err) = self.next_upload_failure(object_name) {
            return Err(err);
        }
        self.insert_object(object_name, &data);
        Ok(())
    }

    async fn object_size(&self, object_name: &str) -> Result<u64, ProviderError> {
        let mut shared = self.shared.lock().unwrap();
        if let Some(err) = shared
            .size_failures
            .get_mut(object_name)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        shared
            .objects
            .get(object_name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| ProviderError::NotFound(object_name.to_string()))
    }
}

pub(crate) struct ScriptedFactory {
    store: ScriptedStore,
}

impl ProviderFactory for ScriptedFactory {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn container_name(&self) -> &str {
        "bucket"
    }

    fn connect(&self) -> Result<Box<dyn ObjectStore>, ProviderError> {
        self.store.shared.lock().unwrap().connects += 1;
        Ok(Box::new(self.store.clone()))
    }
}

pub(crate) fn transient(code: u16) -> ProviderError {
    ProviderError::Status {
        code,
        message: "transient".into(),
    }
}
