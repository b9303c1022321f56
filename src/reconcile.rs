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

use crate::config::OperatorConfig;
use crate::context::{NotFoundExt, Store};
use crate::dataflow::{self, DataOperation};
use crate::engine::{self, CacheEngine, NodeLabelLock};
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, FINALIZER};
use crate::types::v1alpha1::dataset::Dataset;
use crate::utils::retry::{Backoff, Target, update_with_retry};
use crate::{context, types};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use snafu::Snafu;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Engine { source: engine::Error },

    #[snafu(transparent)]
    Dataflow { source: dataflow::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Context { source } => source.is_not_found(),
            Error::Engine { source } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Shared by every reconcile of the process.
pub struct State<S> {
    pub(crate) store: Arc<S>,
    pub(crate) config: OperatorConfig,
    /// One engine per runtime, so the shutdown retry budget survives between passes.
    engines: Mutex<HashMap<(String, String), Arc<CacheEngine<S>>>>,
    node_label_lock: NodeLabelLock,
    backoff: Backoff,
}

impl<S: Store> State<S> {
    pub fn new(store: Arc<S>, config: OperatorConfig) -> Self {
        Self {
            store,
            config,
            engines: Mutex::new(HashMap::new()),
            node_label_lock: NodeLabelLock::default(),
            backoff: Backoff::default(),
        }
    }

    fn engine(&self, namespace: &str, name: &str) -> Arc<CacheEngine<S>> {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        engines
            .entry((namespace.to_owned(), name.to_owned()))
            .or_insert_with(|| {
                Arc::new(
                    CacheEngine::new(
                        self.store.clone(),
                        namespace,
                        name,
                        self.node_label_lock.clone(),
                    )
                    .with_graceful_shutdown_limits(self.config.graceful_shutdown_limits),
                )
            })
            .clone()
    }

    fn forget(&self, namespace: &str, name: &str) {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        engines.remove(&(namespace.to_owned(), name.to_owned()));
    }

    async fn set_finalizer(&self, runtime: &CacheRuntime, present: bool) -> Result<(), Error> {
        let namespace = runtime.namespace()?;
        update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &runtime.name(),
            Some(&namespace),
            Target::Object,
            |runtime: &mut CacheRuntime| {
                let finalizers = runtime.metadata.finalizers.get_or_insert_with(Vec::new);
                finalizers.retain(|f| f != FINALIZER);
                if present {
                    finalizers.push(FINALIZER.to_owned());
                }
            },
        )
        .await
        .optional()?;
        Ok(())
    }
}

pub async fn reconcile_runtime<S: Store>(
    runtime: Arc<CacheRuntime>,
    state: Arc<State<S>>,
) -> Result<Action, Error> {
    let namespace = runtime.namespace()?;
    let name = runtime.name();
    let Some(latest) = state
        .store
        .get::<CacheRuntime>(&name, Some(&namespace))
        .await
        .optional()?
    else {
        debug!("runtime {}/{} is gone", namespace, name);
        state.forget(&namespace, &name);
        return Ok(Action::await_change());
    };

    let engine = state.engine(&namespace, &name);

    if latest.metadata.deletion_timestamp.is_some() {
        if !latest.has_finalizer() {
            return Ok(Action::await_change());
        }
        info!("runtime {}/{} is being deleted", namespace, name);

        engine.shutdown().await?;
        engine.delete_volume().await?;
        engine.unbind_from_dataset().await?;
        state.set_finalizer(&latest, false).await?;
        state.forget(&namespace, &name);
        return Ok(Action::await_change());
    }

    if !latest.has_finalizer() {
        state.set_finalizer(&latest, true).await?;
    }

    match reconcile_engine(&state, &engine, &namespace, &name).await {
        Ok(action) => Ok(action),
        Err(e) => {
            if let Err(record) = state
                .store
                .record(
                    &latest,
                    EventType::Warning,
                    "RuntimeSetupFailed",
                    &e.to_string(),
                )
                .await
            {
                warn!("failed to record event for {}/{}: {}", namespace, name, record);
            }
            Err(e)
        }
    }
}

/// Sets the runtime up until the dataset is bound, then keeps it in sync.
async fn reconcile_engine<S: Store>(
    state: &State<S>,
    engine: &CacheEngine<S>,
    namespace: &str,
    name: &str,
) -> Result<Action, Error> {
    let requeue = Action::requeue(state.config.resync_period());

    let Some(dataset) = state
        .store
        .get::<Dataset>(name, Some(namespace))
        .await
        .optional()?
    else {
        info!("dataset {}/{} not found, waiting for it", namespace, name);
        return Ok(requeue);
    };

    if dataset.is_bound_to(namespace, name) {
        engine.sync().await?;
    } else if !engine.setup().await? {
        debug!("runtime {}/{} is not ready yet", namespace, name);
    }
    Ok(requeue)
}

pub async fn reconcile_operation<T: DataOperation, S: Store>(
    operation: Arc<T>,
    state: Arc<State<S>>,
) -> Result<Action, Error> {
    let needs_requeue =
        dataflow::reconcile_operation_data_flow(state.store.as_ref(), &state.backoff, operation.as_ref())
            .await?;

    if needs_requeue {
        Ok(Action::requeue(state.config.resync_period()))
    } else {
        Ok(Action::await_change())
    }
}

pub fn error_policy<K, S: Store>(_object: Arc<K>, error: &Error, state: Arc<State<S>>) -> Action {
    error!("error_policy: {}", error);
    Action::requeue(state.config.error_requeue())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::FakeStore;
    use crate::types::v1alpha1::dataset::{ACCELERATE_CATEGORY, DatasetPhase, DatasetStatus, RuntimeRef};
    use crate::types::v1alpha1::operation::{DataLoad, DataLoadSpec, OperationKind, OperationRef};
    use k8s_openapi::api::apps::v1 as appsv1;
    use std::time::Duration;

    fn state(store: Arc<FakeStore>) -> Arc<State<FakeStore>> {
        Arc::new(State::new(store, OperatorConfig::default()))
    }

    fn bound_dataset() -> Dataset {
        let mut dataset = crate::tests::create_test_dataset("hbase", "default", 1);
        dataset.status = Some(DatasetStatus {
            phase: DatasetPhase::Bound,
            mounts: dataset.spec.mounts.clone(),
            runtimes: vec![RuntimeRef {
                name: "hbase".to_string(),
                namespace: "default".to_string(),
                category: ACCELERATE_CATEGORY.to_string(),
                type_: "cache".to_string(),
            }],
            ..Default::default()
        });
        dataset
    }

    // Test: the first pass adds the finalizer and creates the workloads
    #[tokio::test]
    async fn test_reconcile_runtime_setup() {
        let store = Arc::new(FakeStore::default());
        let runtime = crate::tests::create_test_runtime("hbase", "default");
        store.insert(runtime.clone());
        store.insert(crate::tests::create_test_runtime_class());
        store.insert(crate::tests::create_test_dataset("hbase", "default", 1));

        let action = reconcile_runtime(Arc::new(runtime), state(store.clone()))
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(60)));

        let runtime: CacheRuntime = store.get_sync("hbase", Some("default")).unwrap();
        assert!(runtime.has_finalizer());
        assert!(
            store
                .get_sync::<appsv1::StatefulSet>("hbase-master", Some("default"))
                .is_some()
        );
        let dataset: Dataset = store.get_sync("hbase", Some("default")).unwrap();
        assert!(!dataset.is_bound_to("default", "hbase"), "master is not ready");
    }

    // Test: a missing dataset is waited for, not an error
    #[tokio::test]
    async fn test_reconcile_runtime_without_dataset() {
        let store = Arc::new(FakeStore::default());
        let runtime = crate::tests::create_test_runtime("hbase", "default");
        store.insert(runtime.clone());
        store.insert(crate::tests::create_test_runtime_class());

        let action = reconcile_runtime(Arc::new(runtime), state(store.clone()))
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(60)));
    }

    // Test: a bound runtime is synced
    #[tokio::test]
    async fn test_reconcile_runtime_sync() {
        let store = Arc::new(FakeStore::default());
        let runtime = crate::tests::create_test_runtime("hbase", "default");
        store.insert(runtime.clone());
        store.insert(crate::tests::create_test_runtime_class());
        store.insert(bound_dataset());

        reconcile_runtime(Arc::new(runtime), state(store.clone()))
            .await
            .unwrap();

        assert!(
            store
                .get_sync::<appsv1::DaemonSet>("hbase-client", Some("default"))
                .is_some()
        );
        assert!(
            store
                .get_sync::<k8s_openapi::api::core::v1::ConfigMap>("hbase-runtimeset", Some("default"))
                .is_some()
        );
    }

    // Test: failures are reported as events and returned
    #[tokio::test]
    async fn test_reconcile_runtime_failure_event() {
        let store = Arc::new(FakeStore::default());
        let runtime = crate::tests::create_test_runtime("hbase", "default");
        store.insert(runtime.clone());
        store.insert(crate::tests::create_test_dataset("hbase", "default", 1));

        let err = reconcile_runtime(Arc::new(runtime), state(store.clone()))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "runtime class is required");
        assert_eq!(store.events_with_reason("RuntimeSetupFailed").len(), 1);
    }

    // Test: deletion tears down, unbinds and releases the finalizer
    #[tokio::test]
    async fn test_reconcile_runtime_deletion() {
        let store = Arc::new(FakeStore::default());
        let mut runtime = crate::tests::create_test_runtime("hbase", "default");
        runtime.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        store.insert(runtime.clone());
        store.insert(crate::tests::create_test_runtime_class());
        store.insert(bound_dataset());
        let state = state(store.clone());

        reconcile_runtime(Arc::new(runtime.clone()), state.clone())
            .await
            .unwrap();
        store.delete::<CacheRuntime>("hbase", Some("default")).await.unwrap();
        let deleting: CacheRuntime = store.get_sync("hbase", Some("default")).unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());

        let action = reconcile_runtime(Arc::new(deleting), state).await.unwrap();
        assert_eq!(action, Action::await_change());

        assert!(store.get_sync::<CacheRuntime>("hbase", Some("default")).is_none());
        assert!(
            store
                .get_sync::<appsv1::StatefulSet>("hbase-worker", Some("default"))
                .is_none()
        );
        let dataset: Dataset = store.get_sync("hbase", Some("default")).unwrap();
        assert_eq!(dataset.status.unwrap().phase, DatasetPhase::NotBound);
    }

    // Test: a waiting operation is requeued, a released one is not
    #[tokio::test]
    async fn test_reconcile_operation() {
        let store = Arc::new(FakeStore::default());
        let mut load = DataLoad::new(
            "load",
            DataLoadSpec {
                run_after: Some(OperationRef {
                    kind: OperationKind::DataLoad,
                    namespace: None,
                    name: "first".to_string(),
                }),
                ..Default::default()
            },
        );
        load.metadata.namespace = Some("default".to_string());
        store.insert(load.clone());

        let action = reconcile_operation(Arc::new(load.clone()), state(store.clone()))
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(60)));

        load.spec.run_after = None;
        let action = reconcile_operation(Arc::new(load), state(store))
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    // Test: errors requeue after the configured delay
    #[test]
    fn test_error_policy() {
        let store = Arc::new(FakeStore::default());
        let runtime = Arc::new(crate::tests::create_test_runtime("hbase", "default"));
        let error = Error::Types {
            source: types::error::Error::NoNamespace,
        };

        let action = error_policy(runtime, &error, state(store));
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    }

    // Test: engines of one controller share the node label lock
    #[tokio::test(start_paused = true)]
    async fn test_engines_share_node_label_lock() {
        let store = Arc::new(FakeStore::default());
        let mut node = crate::tests::create_test_node("node-1");
        let mut labels = std::collections::BTreeMap::new();
        for name in ["alpha", "beta"] {
            store.insert(crate::tests::create_test_runtime(name, "default"));
            let fuse = crate::utils::labels::RuntimeLabels::new("default", name, "runtime-uid-123").fuse();
            labels.insert(fuse, "true".to_string());
        }
        node.metadata.labels = Some(labels);
        store.insert(node);

        let state = state(store.clone());
        let alpha = state.engine("default", "alpha");
        let beta = state.engine("default", "beta");
        assert!(Arc::ptr_eq(&alpha, &state.engine("default", "alpha")));

        let guard = state.node_label_lock.lock().await;
        for engine in [&alpha, &beta] {
            let blocked = tokio::time::timeout(Duration::from_secs(5), engine.shutdown()).await;
            assert!(blocked.is_err(), "label cleanup must wait for the lock");
        }
        drop(guard);

        alpha.shutdown().await.unwrap();
        beta.shutdown().await.unwrap();
        let node: k8s_openapi::api::core::v1::Node = store.get_sync("node-1", None).unwrap();
        assert!(node.metadata.labels.unwrap_or_default().is_empty());
    }
}
