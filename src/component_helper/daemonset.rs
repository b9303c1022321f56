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

use super::{ComponentHelper, TopologyInfo};
use crate::context::{self, Store};
use crate::engine::value::ComponentValue;
use crate::types::v1alpha1::status::ComponentStatus;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as appsv1;
use std::sync::Arc;
use tracing::debug;

/// Node-wide components such as the fuse client. Replicas are decided by the scheduler.
pub struct DaemonSetHelper<S> {
    store: Arc<S>,
}

impl<S: Store> DaemonSetHelper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

pub(crate) fn new_daemonset(component: &ComponentValue) -> appsv1::DaemonSet {
    appsv1::DaemonSet {
        metadata: super::workload_metadata(component),
        spec: Some(appsv1::DaemonSetSpec {
            selector: super::selector(component),
            template: super::pod_template(component),
            update_strategy: Some(appsv1::DaemonSetUpdateStrategy {
                type_: Some("OnDelete".to_owned()),
                rolling_update: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl<S: Store> ComponentHelper for DaemonSetHelper<S> {
    async fn reconcile(&self, component: &ComponentValue) -> Result<(), context::Error> {
        debug!(
            "applying daemonset {}/{}",
            component.namespace, component.name
        );
        super::apply_service(self.store.as_ref(), component).await?;
        self.store.apply(&new_daemonset(component)).await?;
        Ok(())
    }

    async fn check_component_exist(
        &self,
        component: &ComponentValue,
    ) -> Result<bool, context::Error> {
        super::workload_exists::<S, appsv1::DaemonSet>(self.store.as_ref(), component).await
    }

    async fn construct_component_status(
        &self,
        component: &ComponentValue,
    ) -> Result<ComponentStatus, context::Error> {
        let ds: appsv1::DaemonSet = self
            .store
            .get(&component.name, Some(&component.namespace))
            .await?;

        let (ready, desired) = ds
            .status
            .as_ref()
            .map(|status| (status.number_ready, status.desired_number_scheduled))
            .unwrap_or_default();

        Ok(ComponentStatus::from_replicas(ready, desired))
    }

    async fn get_component_topology_info(
        &self,
        component: &ComponentValue,
    ) -> Result<TopologyInfo, context::Error> {
        super::topology_info(self.store.as_ref(), component).await
    }

    async fn destroy(&self, component: &ComponentValue) -> Result<(), context::Error> {
        super::destroy_workload::<S, appsv1::DaemonSet>(self.store.as_ref(), component).await
    }
}
