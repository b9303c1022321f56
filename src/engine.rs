// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lifecycle of one cache runtime: setup, sync, status, binding, volumes and teardown.

mod config;
mod dataset;
mod lifecycle;
mod shutdown;
mod status;
pub mod transform;
pub mod value;
mod volume;

pub use shutdown::{NoopHooks, ShutdownHooks};
pub use volume::should_remove_protection_finalizer;

use crate::component_helper::{ComponentHelper, HelperRegistry};
use crate::context::{self, Object, Store};
use crate::types;
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, Role};
use crate::types::v1alpha1::cache_runtime_class::CacheRuntimeClass;
use crate::types::v1alpha1::dataset::Dataset;
use crate::utils::retry::Backoff;
use kube::runtime::events::EventType;
use snafu::Snafu;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use tracing::{debug, info, warn};
use value::{ComponentValue, RuntimeValue};

/// Serializes node label edits of concurrent teardowns. Shared by every engine of the process.
pub type NodeLabelLock = Arc<tokio::sync::Mutex<()>>;

pub const DEFAULT_GRACEFUL_SHUTDOWN_LIMITS: u32 = 5;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("failed to clean cache of runtime {} (attempt {}): {}", name, attempt, source))]
    CleanCache {
        name: String,
        attempt: u32,
        source: context::Error,
    },

    #[snafu(display("{} '{}' still exists after {} checks", kind, name, attempts))]
    DeletionTimeout {
        kind: String,
        name: String,
        attempts: u32,
    },

    #[snafu(display(
        "cannot remove pvc-protection finalizer of '{}': incomplete pod '{}' still mounts it",
        name,
        pod
    ))]
    VolumeInUse { name: String, pod: String },

    #[snafu(display("failed to encode runtime config: {}", source))]
    EncodeConfig { source: serde_json::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Context { source } if source.is_not_found())
    }
}

/// Everything a reconcile pass derives from the cluster before acting.
pub(crate) struct Inputs {
    pub runtime: CacheRuntime,
    pub dataset: Dataset,
    pub value: RuntimeValue,
}

pub struct CacheEngine<S> {
    store: Arc<S>,
    namespace: String,
    name: String,
    helpers: HelperRegistry,
    hooks: Arc<dyn ShutdownHooks>,
    node_label_lock: NodeLabelLock,
    backoff: Backoff,
    graceful_shutdown_limits: u32,
    /// Failed cache clean attempts, kept for the lifetime of the engine.
    retry_shutdown: AtomicU32,
}

impl<S: Store> CacheEngine<S> {
    pub fn new(store: Arc<S>, namespace: &str, name: &str, node_label_lock: NodeLabelLock) -> Self {
        Self {
            helpers: HelperRegistry::with_workloads(store.clone()),
            store,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            hooks: Arc::new(NoopHooks),
            node_label_lock,
            backoff: Backoff::default(),
            graceful_shutdown_limits: DEFAULT_GRACEFUL_SHUTDOWN_LIMITS,
            retry_shutdown: AtomicU32::new(0),
        }
    }

    pub fn with_helpers(mut self, helpers: HelperRegistry) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ShutdownHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_graceful_shutdown_limits(mut self, limits: u32) -> Self {
        self.graceful_shutdown_limits = limits;
        self
    }

    /// `<namespace>/<name>`
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    async fn runtime(&self) -> Result<CacheRuntime, context::Error> {
        self.store.get(&self.name, Some(&self.namespace)).await
    }

    async fn dataset(&self) -> Result<Dataset, context::Error> {
        self.store.get(&self.name, Some(&self.namespace)).await
    }

    async fn runtime_class(&self, runtime: &CacheRuntime) -> Result<CacheRuntimeClass, context::Error> {
        self.store.get(&runtime.spec.runtime_class_name, None).await
    }

    /// Reads runtime, dataset and class, and merges them.
    pub(crate) async fn load(&self) -> Result<Inputs, Error> {
        let runtime = self.runtime().await?;
        let dataset = self.dataset().await?;
        let class = self.runtime_class(&runtime).await?;
        let value = transform::transform(&dataset, &runtime, &class)?;
        Ok(Inputs {
            runtime,
            dataset,
            value,
        })
    }

    fn helper(&self, component: &ComponentValue) -> Result<Arc<dyn ComponentHelper>, Error> {
        Ok(self.helpers.get(&component.workload_type)?)
    }

    /// Events are informational; a failed publish is logged and dropped.
    async fn record<T: Object>(&self, resource: &T, event_type: EventType, reason: &str, message: &str) {
        if let Err(e) = self.store.record(resource, event_type, reason, message).await {
            warn!("failed to record event {} for {}: {}", reason, self.id(), e);
        }
    }

    /// Brings the runtime up and binds it to its dataset. Returns whether it is ready.
    ///
    /// Components are handled master first; a master or worker that is not usable yet
    /// stops the pass. The client never blocks setup.
    pub async fn setup(&self) -> Result<bool, Error> {
        let Inputs {
            runtime,
            dataset,
            value,
        } = self.load().await?;

        self.sync_config(&runtime, &dataset, &value).await?;

        for role in Role::ALL {
            let component = value.component(role);
            if !component.enabled {
                continue;
            }

            self.setup_component(component).await?;
            let usable = self.check_component_ready(component).await?;
            if !usable && role != Role::Client {
                info!("{} of runtime {} is not ready yet", role, self.id());
                return Ok(false);
            }
        }

        if !self.check_and_update_runtime_status(&value).await? {
            debug!("runtime {} is not ready yet", self.id());
            return Ok(false);
        }

        if value.client.enabled {
            self.create_volume(&runtime, &dataset, &value).await?;
        }
        self.bind_to_dataset().await?;

        Ok(true)
    }

    /// Re-applies the merged value to an already set up runtime.
    pub async fn sync(&self) -> Result<(), Error> {
        let Inputs {
            runtime,
            dataset,
            value,
        } = self.load().await?;

        self.sync_config(&runtime, &dataset, &value).await?;
        for role in Role::ALL {
            let component = value.component(role);
            if component.enabled {
                self.helper(component)?.reconcile(component).await?;
            }
        }
        self.check_and_update_runtime_status(&value).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::component_helper::MockComponentHelper;
    use crate::tests::FakeStore;
    use crate::types::v1alpha1::dataset::DatasetPhase;
    use crate::types::v1alpha1::status::{ComponentStatus, RuntimePhase};
    use k8s_openapi::api::core::v1 as corev1;

    fn ready_helper() -> MockComponentHelper {
        let mut helper = MockComponentHelper::new();
        helper.expect_reconcile().returning(|_| Ok(()));
        helper
            .expect_construct_component_status()
            .returning(|c| Ok(ComponentStatus::from_replicas(c.replicas, c.replicas)));
        helper
            .expect_get_component_topology_info()
            .returning(|_| Ok(Default::default()));
        helper
    }

    fn engine_with(store: Arc<FakeStore>, helper: MockComponentHelper) -> CacheEngine<FakeStore> {
        let helper: Arc<dyn ComponentHelper> = Arc::new(helper);
        let mut helpers = HelperRegistry::default();
        helpers.register("StatefulSet", helper.clone());
        helpers.register("DaemonSet", helper);
        CacheEngine::new(store, "default", "hbase", NodeLabelLock::default()).with_helpers(helpers)
    }

    // Test: worker and client only, master absent from the class
    #[tokio::test(start_paused = true)]
    async fn test_setup_worker_and_client_only() {
        let store = Arc::new(FakeStore::default());
        let mut class = crate::tests::create_test_runtime_class();
        class.spec.topology.as_mut().unwrap().master = None;
        store.insert(class);
        store.insert(crate::tests::create_test_runtime("hbase", "default"));
        store.insert(crate::tests::create_test_dataset("hbase", "default", 1));

        let engine = engine_with(store.clone(), ready_helper());
        let ready = engine.setup().await.expect("setup should succeed");
        assert!(ready, "master is vacuously ready");

        let runtime: CacheRuntime = store.get("hbase", Some("default")).await.unwrap();
        let status = runtime.status.unwrap();
        assert_eq!(status.master.phase, RuntimePhase::None, "master never touched");
        assert_eq!(status.worker.phase, RuntimePhase::Ready);
        assert_eq!(status.client.phase, RuntimePhase::Ready);
        assert!(status.setup_duration.is_some());

        let dataset: Dataset = store.get("hbase", Some("default")).await.unwrap();
        assert_eq!(dataset.status.unwrap().phase, DatasetPhase::Bound);

        let pvc: Option<corev1::PersistentVolumeClaim> =
            store.get("hbase", Some("default")).await.ok();
        assert!(pvc.is_some(), "client enabled means a volume is provisioned");
    }

    // Test: a second setup of a ready runtime writes nothing
    #[tokio::test(start_paused = true)]
    async fn test_setup_is_idempotent() {
        let store = Arc::new(FakeStore::default());
        store.insert(crate::tests::create_test_runtime_class());
        store.insert(crate::tests::create_test_runtime("hbase", "default"));
        store.insert(crate::tests::create_test_dataset("hbase", "default", 1));

        let engine = engine_with(store.clone(), ready_helper());
        assert!(engine.setup().await.unwrap());

        let writes = store.writes();
        assert!(engine.setup().await.unwrap());
        assert_eq!(store.writes(), writes, "no write on the second pass");
    }

    // Test: a worker that is not ready stops setup before the client
    #[tokio::test(start_paused = true)]
    async fn test_setup_short_circuits_on_worker() {
        let store = Arc::new(FakeStore::default());
        store.insert(crate::tests::create_test_runtime_class());
        store.insert(crate::tests::create_test_runtime("hbase", "default"));
        store.insert(crate::tests::create_test_dataset("hbase", "default", 1));

        let mut helper = MockComponentHelper::new();
        helper
            .expect_reconcile()
            .withf(|c| c.role != Role::Client)
            .returning(|_| Ok(()));
        helper
            .expect_construct_component_status()
            .returning(|c| match c.role {
                Role::Worker => Ok(ComponentStatus::from_replicas(0, 2)),
                _ => Ok(ComponentStatus::from_replicas(1, 1)),
            });
        helper
            .expect_get_component_topology_info()
            .returning(|_| Ok(Default::default()));

        let engine = engine_with(store.clone(), helper);
        assert!(!engine.setup().await.unwrap());

        let runtime: CacheRuntime = store.get("hbase", Some("default")).await.unwrap();
        let status = runtime.status.unwrap();
        assert_eq!(status.master.phase, RuntimePhase::Ready);
        assert_eq!(status.worker.phase, RuntimePhase::NotReady);
        assert_eq!(status.client.phase, RuntimePhase::None);

        let dataset: Dataset = store.get("hbase", Some("default")).await.unwrap();
        assert!(dataset.status.is_none(), "dataset stays unbound");
    }

    // Test: a class naming an unknown workload kind fails setup with a validation error
    #[tokio::test]
    async fn test_setup_unsupported_workload() {
        let store = Arc::new(FakeStore::default());
        let mut class = crate::tests::create_test_runtime_class();
        class
            .spec
            .topology
            .as_mut()
            .unwrap()
            .master
            .as_mut()
            .unwrap()
            .workload_type
            .kind = "Deployment".to_string();
        store.insert(class);
        store.insert(crate::tests::create_test_runtime("hbase", "default"));
        store.insert(crate::tests::create_test_dataset("hbase", "default", 1));

        let engine = engine_with(store, ready_helper());
        let err = engine.setup().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Types {
                source: types::error::Error::UnsupportedWorkloadType { .. }
            }
        ));
    }

    // Test: a missing dataset is a required-lookup NotFound
    #[tokio::test]
    async fn test_setup_without_dataset() {
        let store = Arc::new(FakeStore::default());
        store.insert(crate::tests::create_test_runtime_class());
        store.insert(crate::tests::create_test_runtime("hbase", "default"));

        let engine = engine_with(store, ready_helper());
        assert!(engine.setup().await.unwrap_err().is_not_found());
    }
}
