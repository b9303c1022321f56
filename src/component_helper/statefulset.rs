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

/// Master and worker components: a fixed number of ordinal pods.
pub struct StatefulSetHelper<S> {
    store: Arc<S>,
}

impl<S: Store> StatefulSetHelper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

pub(crate) fn new_statefulset(component: &ComponentValue) -> appsv1::StatefulSet {
    appsv1::StatefulSet {
        metadata: super::workload_metadata(component),
        spec: Some(appsv1::StatefulSetSpec {
            replicas: Some(component.replicas),
            service_name: component.service.as_ref().map(|s| s.name.clone()),
            pod_management_policy: Some("Parallel".to_owned()),
            selector: super::selector(component),
            template: super::pod_template(component),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl<S: Store> ComponentHelper for StatefulSetHelper<S> {
    async fn reconcile(&self, component: &ComponentValue) -> Result<(), context::Error> {
        debug!(
            "applying statefulset {}/{} with {} replicas",
            component.namespace, component.name, component.replicas
        );
        super::apply_service(self.store.as_ref(), component).await?;
        self.store.apply(&new_statefulset(component)).await?;
        Ok(())
    }

    async fn check_component_exist(
        &self,
        component: &ComponentValue,
    ) -> Result<bool, context::Error> {
        super::workload_exists::<S, appsv1::StatefulSet>(self.store.as_ref(), component).await
    }

    async fn construct_component_status(
        &self,
        component: &ComponentValue,
    ) -> Result<ComponentStatus, context::Error> {
        let sts: appsv1::StatefulSet = self
            .store
            .get(&component.name, Some(&component.namespace))
            .await?;

        let desired = sts
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let ready = sts
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);

        Ok(ComponentStatus::from_replicas(ready, desired))
    }

    async fn get_component_topology_info(
        &self,
        component: &ComponentValue,
    ) -> Result<TopologyInfo, context::Error> {
        super::topology_info(self.store.as_ref(), component).await
    }

    async fn destroy(&self, component: &ComponentValue) -> Result<(), context::Error> {
        super::destroy_workload::<S, appsv1::StatefulSet>(self.store.as_ref(), component).await
    }
}
