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

use super::{CacheEngine, Error};
use crate::context::Store;
use crate::engine::value::ComponentValue;
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, Role};
use crate::types::v1alpha1::status::{ComponentStatus, Condition, RuntimePhase, Status, condition};
use crate::utils::retry::{Target, update_with_retry};
use crate::utils::time::rfc3339;
use kube::runtime::events::EventType;
use tracing::info;

impl<S: Store> CacheEngine<S> {
    /// Creates the workload of a component that was never set up.
    ///
    /// Only a stored phase of `None` triggers the helper; afterwards the component is
    /// `NotReady` until [`Self::check_component_ready`] observes otherwise.
    pub async fn setup_component(&self, component: &ComponentValue) -> Result<bool, Error> {
        let role = component.role;
        let runtime = self.runtime().await?;
        let phase = runtime
            .status
            .as_ref()
            .map(|status| status.component(role).phase)
            .unwrap_or_default();
        if phase != RuntimePhase::None {
            return Ok(true);
        }

        info!("setting up {} of runtime {}", role, self.id());
        self.helper(component)?.reconcile(component).await?;

        let now = rfc3339(chrono::Utc::now());
        let message = format!("The {role} is initialized.");
        let updated = update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Status,
            |runtime: &mut CacheRuntime| {
                let status = runtime.status.get_or_insert_with(Default::default);
                status.component_mut(role).phase = RuntimePhase::NotReady;
                condition::upsert(
                    &mut status.conditions,
                    Condition::new(role.initialized_condition(), true, message.clone(), &now),
                );
            },
        )
        .await?;

        if let Some(runtime) = updated {
            self.record(&runtime, EventType::Normal, "ComponentInitialized", &message)
                .await;
        }
        Ok(true)
    }

    /// Observes the component and records phase changes. Returns whether it is usable.
    pub async fn check_component_ready(&self, component: &ComponentValue) -> Result<bool, Error> {
        let role = component.role;
        let observed = self
            .helper(component)?
            .construct_component_status(component)
            .await?;
        let phase = observed.phase;

        let now = rfc3339(chrono::Utc::now());
        update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Status,
            |runtime: &mut CacheRuntime| {
                let status = runtime.status.get_or_insert_with(Default::default);
                if status.component(role).phase == phase {
                    return;
                }
                set_observed(status, role, &observed, &now);
            },
        )
        .await?;

        Ok(phase.is_usable())
    }
}

/// Stores an observed component status. A phase change moves the role's Ready
/// condition in the same write.
pub(super) fn set_observed(status: &mut Status, role: Role, observed: &ComponentStatus, now: &str) {
    let phase = observed.phase;
    if status.component(role).phase != phase {
        let message = format!(
            "The {role} is {phase}: {}/{} replicas ready.",
            observed.ready_replicas, observed.desired_replicas
        );
        condition::upsert(
            &mut status.conditions,
            Condition::new(role.ready_condition(), phase.is_usable(), message, now),
        );
    }
    *status.component_mut(role) = observed.clone();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::component_helper::{ComponentHelper, HelperRegistry, MockComponentHelper};
    use crate::context::Store;
    use crate::engine::{CacheEngine, NodeLabelLock};
    use crate::tests::FakeStore;
    use crate::types::v1alpha1::cache_runtime::{CacheRuntime, Role};
    use crate::types::v1alpha1::k8s::ConditionStatus;
    use crate::types::v1alpha1::status::{ComponentStatus, RuntimePhase};
    use std::sync::Arc;

    fn engine(store: Arc<FakeStore>, helper: MockComponentHelper) -> CacheEngine<FakeStore> {
        let helper: Arc<dyn ComponentHelper> = Arc::new(helper);
        let mut helpers = HelperRegistry::default();
        helpers.register("StatefulSet", helper);
        CacheEngine::new(store, "default", "hbase", NodeLabelLock::default()).with_helpers(helpers)
    }

    // Test: first setup reconciles once and marks the component initialized
    #[tokio::test]
    async fn test_setup_component_once() {
        let store = Arc::new(FakeStore::default());
        store.insert(crate::tests::create_test_runtime("hbase", "default"));

        let mut helper = MockComponentHelper::new();
        helper.expect_reconcile().times(1).returning(|_| Ok(()));
        let engine = engine(store.clone(), helper);
        let component = crate::tests::create_test_component_value(Role::Master);

        assert!(engine.setup_component(&component).await.unwrap());
        assert!(engine.setup_component(&component).await.unwrap());

        let runtime: CacheRuntime = store.get("hbase", Some("default")).await.unwrap();
        let status = runtime.status.unwrap();
        assert_eq!(status.master.phase, RuntimePhase::NotReady);
        let initialized = status
            .conditions
            .iter()
            .find(|c| c.type_ == "MasterInitialized")
            .unwrap();
        assert_eq!(initialized.status, ConditionStatus::True);
        assert_eq!(store.events_with_reason("ComponentInitialized").len(), 1);
    }

    // Test: partial readiness is usable and only phase changes are written
    #[tokio::test]
    async fn test_check_component_ready_writes_on_change() {
        let store = Arc::new(FakeStore::default());
        store.insert(crate::tests::create_test_runtime("hbase", "default"));

        let mut helper = MockComponentHelper::new();
        let mut counts = vec![(2, 3), (1, 3), (3, 3)].into_iter();
        helper
            .expect_construct_component_status()
            .times(3)
            .returning(move |_| {
                let (ready, desired) = counts.next().unwrap();
                Ok(ComponentStatus::from_replicas(ready, desired))
            });
        let engine = engine(store.clone(), helper);
        let component = crate::tests::create_test_component_value(Role::Worker);

        assert!(engine.check_component_ready(&component).await.unwrap());
        let writes = store.writes();

        // same phase, different counts: nothing written
        assert!(engine.check_component_ready(&component).await.unwrap());
        assert_eq!(store.writes(), writes);
        let runtime: CacheRuntime = store.get("hbase", Some("default")).await.unwrap();
        assert_eq!(runtime.status.as_ref().unwrap().worker.ready_replicas, 2);

        assert!(engine.check_component_ready(&component).await.unwrap());
        let runtime: CacheRuntime = store.get("hbase", Some("default")).await.unwrap();
        let status = runtime.status.unwrap();
        assert_eq!(status.worker.phase, RuntimePhase::Ready);
        let ready = status
            .conditions
            .iter()
            .find(|c| c.type_ == "WorkersReady")
            .unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
    }

    // Test: no ready replicas out of some desired is not usable
    #[tokio::test]
    async fn test_check_component_not_ready() {
        let store = Arc::new(FakeStore::default());
        store.insert(crate::tests::create_test_runtime("hbase", "default"));

        let mut helper = MockComponentHelper::new();
        helper
            .expect_construct_component_status()
            .returning(|_| Ok(ComponentStatus::from_replicas(0, 2)));
        let engine = engine(store.clone(), helper);
        let component = crate::tests::create_test_component_value(Role::Worker);

        assert!(!engine.check_component_ready(&component).await.unwrap());
    }
}
