//! Model Registry: lazily constructs and caches one `AcousticModel` plus one
//! concurrency-gating semaphore per `ModelKey`.
//!
//! Uses the double-checked-locking pattern over a `tokio::sync::RwLock`-
//! protected map: a read lock serves the common "already loaded" case, and a
//! per-key build lock (itself lazily inserted under its own map) ensures
//! concurrent first-callers for the same key don't race to construct the
//! model twice. Nothing here depends on a concurrent map crate — the pack
//! never reaches for one, so an `RwLock<HashMap<_>>` is the idiomatic choice.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, Semaphore};

use crate::error::SttError;
use crate::model::AcousticModel;
use crate::types::ModelKey;
use crate::whisper_model::{resolve_model_path, WhisperRsModel};

pub struct ModelRegistry {
    models: RwLock<HashMap<ModelKey, Arc<dyn AcousticModel>>>,
    build_locks: RwLock<HashMap<ModelKey, Arc<Mutex<()>>>>,
    semaphores: RwLock<HashMap<ModelKey, Arc<Semaphore>>>,
    models_dir: PathBuf,
    model_base_url: String,
}

impl ModelRegistry {
    pub fn new(models_dir: PathBuf, model_base_url: String) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            build_locks: RwLock::new(HashMap::new()),
            semaphores: RwLock::new(HashMap::new()),
            models_dir,
            model_base_url,
        }
    }

    /// Whether `key` already has a cached model, without taking part in any
    /// build. Used by the resource manager to zero out resident cost for
    /// warm models.
    pub async fn is_loaded(&self, key: &ModelKey) -> bool {
        self.models.read().await.contains_key(key)
    }

    /// Seed `key` with an already-constructed model, skipping
    /// `resolve_model_path`/`WhisperRsModel::load` entirely. Used by tests to
    /// substitute a `MockAcousticModel` for a real GGML file.
    pub async fn insert_preloaded(&self, key: ModelKey, model: Arc<dyn AcousticModel>) {
        self.models.write().await.insert(key, model);
    }

    async fn get_build_lock(&self, key: &ModelKey) -> Arc<Mutex<()>> {
        if let Some(lock) = self.build_locks.read().await.get(key) {
            return lock.clone();
        }
        let mut locks = self.build_locks.write().await;
        locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Return the cached model for `key`, constructing it via `builder` if
    /// this is the first request for this key. Concurrent first-callers for
    /// the same key serialise on a per-key lock rather than a global one, so
    /// unrelated keys never block each other.
    pub async fn get_or_create(&self, key: &ModelKey, use_gpu: bool) -> Result<Arc<dyn AcousticModel>, SttError> {
        self.get_or_create_with(key, || self.build_model(key, use_gpu)).await
    }

    /// Same double-checked-locking protocol as `get_or_create`, with the
    /// construction step supplied by the caller instead of hard-coded to
    /// `build_model`. Exists so the single-construction race can be tested
    /// against a counting stub instead of a real GGML file.
    async fn get_or_create_with<F, Fut>(&self, key: &ModelKey, builder: F) -> Result<Arc<dyn AcousticModel>, SttError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Box<dyn AcousticModel>, SttError>>,
    {
        if let Some(model) = self.models.read().await.get(key) {
            return Ok(model.clone());
        }

        let build_lock = self.get_build_lock(key).await;
        let _guard = build_lock.lock().await;

        // Re-check after acquiring the build lock: another caller may have
        // finished constructing this key while we were waiting.
        if let Some(model) = self.models.read().await.get(key) {
            return Ok(model.clone());
        }

        let model = builder().await?;
        let model: Arc<dyn AcousticModel> = Arc::from(model);
        self.models.write().await.insert(key.clone(), model.clone());
        Ok(model)
    }

    async fn build_model(&self, key: &ModelKey, use_gpu: bool) -> Result<Box<dyn AcousticModel>, SttError> {
        let path = resolve_model_path(&self.models_dir, &key.model_name, &self.model_base_url).await?;
        let name = key.model_name.clone();
        let model_name = key.model_name.clone();
        tokio::task::spawn_blocking(move || -> Result<Box<dyn AcousticModel>, SttError> {
            let model = WhisperRsModel::load(&name, &path, use_gpu)?;
            Ok(Box::new(model))
        })
        .await
        .map_err(|e| SttError::ModelLoadFailed(format!("{model_name}: join error: {e}")))?
    }

    /// Return (lazily creating) the semaphore gating concurrent inferences
    /// against `key`, sized to `permits`. The permit count is fixed at
    /// first creation — a later `concurrency_hint` for the same key does
    /// not resize an existing semaphore.
    pub async fn get_semaphore(&self, key: &ModelKey, permits: usize) -> Arc<Semaphore> {
        if let Some(sem) = self.semaphores.read().await.get(key) {
            return sem.clone();
        }
        let mut semaphores = self.semaphores.write().await;
        semaphores
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(permits.max(1))))
            .clone()
    }
}
