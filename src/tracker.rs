//! Port Exposure Tracker
//!
//! Keeps an in-memory table of container ID -> exposed bindings in step
//! with the Exposure Service.
//!
//! ## Consistency rules
//!
//! - A binding is recorded only after the service acknowledged exposing it.
//!   A failed binding does not stop the rest of the batch, and the bindings
//!   that did succeed stay recorded.
//! - `remove` forgets the container locally no matter how its unexpose
//!   calls turn out; a dangling remote binding is preferred over a tracked
//!   binding whose remote state is unknown.
//! - Batches on one container are serialized; batches on different
//!   containers run concurrently. The table lock is never held across a
//!   remote call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::api::{ExposeRequest, ExposureApi, ExposureClient, UnexposeRequest};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::types::{binding_count, PortBinding, PortMap, Protocol};

/// Tracks which container ports are exposed through the Exposure Service
pub struct Tracker<A = ExposureClient> {
    api: A,
    switch_ip: String,
    containers: Mutex<HashMap<String, PortMap>>,
    batch_locks: BatchLocks,
}

impl Tracker<ExposureClient> {
    /// Tracker bound to the Exposure Service at `base_url`
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::from_config(&TrackerConfig::new(base_url))
    }

    pub fn from_config(config: &TrackerConfig) -> anyhow::Result<Self> {
        let api = ExposureClient::new(config)?;
        Ok(Self::with_api(api, config.switch_ip.clone()))
    }
}

impl<A: ExposureApi> Tracker<A> {
    /// Tracker over any Exposure Service implementation
    pub fn with_api(api: A, switch_ip: impl Into<String>) -> Self {
        Self {
            api,
            switch_ip: switch_ip.into(),
            containers: Mutex::new(HashMap::new()),
            batch_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn switch_ip(&self) -> &str {
        &self.switch_ip
    }

    /// Expose every binding in `ports` and record the ones that succeed.
    ///
    /// Keys are processed in sorted order (`PortMap` is a `BTreeMap`), then
    /// bindings in the order given under each key; "first failure" follows
    /// that order, not the order keys were inserted.
    ///
    /// Bindings already tracked for the container are skipped. On failure
    /// the first failing binding is returned; successes are kept.
    pub async fn add(&self, container_id: &str, ports: &PortMap) -> Result<()> {
        let _batch = self.lock_batch(container_id).await;

        let mut failures = FirstFailure::default();
        let mut exposed = 0;

        for (key, bindings) in ports {
            let protocol = Protocol::from_port_key(key);

            for binding in bindings {
                if self.is_tracked(container_id, key, binding) {
                    debug!(container_id, port = %key, binding = %binding, "Binding already exposed");
                    continue;
                }

                let request = ExposeRequest {
                    local: binding.local_addr(),
                    remote: binding.remote_addr(&self.switch_ip),
                    protocol,
                };

                match self.api.expose(&request).await {
                    Ok(()) => {
                        self.record(container_id, key, binding);
                        exposed += 1;
                    }
                    Err(source) => {
                        warn!(container_id, port = %key, binding = %binding, error = %source, "Failed to expose binding");
                        failures.record(TrackerError::Expose {
                            binding: binding.clone(),
                            source,
                        });
                    }
                }
            }
        }

        info!(
            container_id,
            exposed,
            failed = failures.count,
            "Exposed container ports"
        );

        failures.into_result()
    }

    /// Copy of the container's tracked ports, `None` if untracked
    pub fn get(&self, container_id: &str) -> Option<PortMap> {
        self.table().get(container_id).cloned()
    }

    /// Unexpose every tracked binding of the container and forget it.
    ///
    /// Untracked containers are a no-op. The container is untracked once
    /// this returns, even if some unexpose calls failed.
    pub async fn remove(&self, container_id: &str) -> Result<()> {
        let _batch = self.lock_batch(container_id).await;

        // Detached up front so a cancelled call still leaves it untracked
        let ports = self.table().remove(container_id);
        let Some(ports) = ports else {
            return Ok(());
        };

        let mut failures = FirstFailure::default();

        for (key, bindings) in &ports {
            let protocol = Protocol::from_port_key(key);

            for binding in bindings {
                let request = UnexposeRequest {
                    local: binding.local_addr(),
                    protocol,
                };

                if let Err(source) = self.api.unexpose(&request).await {
                    warn!(container_id, port = %key, binding = %binding, error = %source, "Failed to unexpose binding");
                    failures.record(TrackerError::Unexpose {
                        binding: binding.clone(),
                        source,
                    });
                }
            }
        }

        info!(
            container_id,
            unexposed = binding_count(&ports) - failures.count,
            failed = failures.count,
            "Removed container ports"
        );

        failures.into_result()
    }

    /// Remove every tracked container, continuing past failures.
    ///
    /// Returns the first failure encountered.
    pub async fn remove_all(&self) -> Result<()> {
        let container_ids = self.containers();
        let mut failures = FirstFailure::default();

        for container_id in &container_ids {
            if let Err(err) = self.remove(container_id).await {
                failures.record(err);
            }
        }

        info!(
            containers = container_ids.len(),
            failed = failures.count,
            "Removed all tracked containers"
        );

        failures.into_result()
    }

    /// Sorted IDs of all tracked containers
    pub fn containers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.table().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, PortMap>> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_tracked(&self, container_id: &str, key: &str, binding: &PortBinding) -> bool {
        self.table()
            .get(container_id)
            .and_then(|ports| ports.get(key))
            .is_some_and(|bindings| bindings.contains(binding))
    }

    fn record(&self, container_id: &str, key: &str, binding: &PortBinding) {
        self.table()
            .entry(container_id.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(binding.clone());
    }

    /// Serialize batches on one container. The returned guard frees the
    /// container's lock slot when dropped, including on cancellation.
    async fn lock_batch(&self, container_id: &str) -> BatchGuard<'_> {
        let lock = {
            let mut locks = self
                .batch_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(container_id.to_string()).or_default().clone()
        };

        let mut batch = BatchGuard {
            locks: &self.batch_locks,
            container_id: container_id.to_string(),
            guard: None,
        };
        batch.guard = Some(lock.lock_owned().await);
        batch
    }
}

type BatchLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Held for the duration of a batch on one container
struct BatchGuard<'a> {
    locks: &'a BatchLocks,
    container_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(&self.container_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.container_id);
        }
    }
}

/// Keeps the first error of a batch and counts the rest
#[derive(Debug, Default)]
struct FirstFailure {
    first: Option<TrackerError>,
    count: usize,
}

impl FirstFailure {
    fn record(&mut self, err: TrackerError) {
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(err);
        }
    }

    fn into_result(self) -> Result<()> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
