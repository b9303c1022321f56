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

//! Per workload type drivers of a runtime component.

mod daemonset;
mod statefulset;

pub use daemonset::DaemonSetHelper;
pub use statefulset::StatefulSetHelper;

use crate::context::{self, NotFoundExt, Object, Store};
use crate::engine::value::{ComponentValue, ServiceValue};
use crate::types;
use crate::types::v1alpha1::cache_runtime_class::WorkloadType;
use crate::types::v1alpha1::status::ComponentStatus;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Where the pods of a component can be reached, published in the runtime config.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyInfo {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pod_configs: Vec<PodConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PodConfig {
    #[serde(rename = "podName")]
    pub pod_name: String,

    #[serde(rename = "podIP", skip_serializing_if = "String::is_empty")]
    pub pod_ip: String,

    #[serde(rename = "hostIp", skip_serializing_if = "String::is_empty")]
    pub host_ip: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PortConfig {
    pub name: String,
    pub port: i32,
}

/// Drives the workload behind one component.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentHelper: Send + Sync {
    /// Creates or updates the workload and its service.
    async fn reconcile(&self, component: &ComponentValue) -> Result<(), context::Error>;

    /// Whether the workload is still present.
    async fn check_component_exist(&self, component: &ComponentValue)
    -> Result<bool, context::Error>;

    /// Ready and desired replicas with the derived phase.
    async fn construct_component_status(
        &self,
        component: &ComponentValue,
    ) -> Result<ComponentStatus, context::Error>;

    async fn get_component_topology_info(
        &self,
        component: &ComponentValue,
    ) -> Result<TopologyInfo, context::Error>;

    /// Deletes the workload and its service. Missing objects are not an error.
    async fn destroy(&self, component: &ComponentValue) -> Result<(), context::Error>;
}

/// Helpers looked up by workload kind.
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: BTreeMap<String, Arc<dyn ComponentHelper>>,
}

impl HelperRegistry {
    /// StatefulSet and DaemonSet helpers backed by `store`.
    pub fn with_workloads<S: Store>(store: Arc<S>) -> Self {
        let mut registry = Self::default();
        registry.register("StatefulSet", Arc::new(StatefulSetHelper::new(store.clone())));
        registry.register("DaemonSet", Arc::new(DaemonSetHelper::new(store)));
        registry
    }

    pub fn register(&mut self, kind: &str, helper: Arc<dyn ComponentHelper>) {
        self.helpers.insert(kind.to_owned(), helper);
    }

    pub fn get(
        &self,
        workload_type: &WorkloadType,
    ) -> Result<Arc<dyn ComponentHelper>, types::error::Error> {
        self.helpers.get(&workload_type.kind).cloned().ok_or_else(|| {
            types::error::Error::UnsupportedWorkloadType {
                api_version: workload_type.api_version.clone(),
                kind: workload_type.kind.clone(),
            }
        })
    }
}

/// Metadata of the workload: component name, selector labels, owned by the runtime.
fn workload_metadata(component: &ComponentValue) -> metav1::ObjectMeta {
    metav1::ObjectMeta {
        name: Some(component.name.clone()),
        namespace: Some(component.namespace.clone()),
        labels: Some(component.selector_labels()),
        owner_references: component.owner.clone().map(|owner| vec![owner]),
        ..Default::default()
    }
}

fn selector(component: &ComponentValue) -> metav1::LabelSelector {
    metav1::LabelSelector {
        match_labels: Some(component.selector_labels()),
        match_expressions: None,
    }
}

/// The merged pod template carrying the selector labels.
fn pod_template(component: &ComponentValue) -> corev1::PodTemplateSpec {
    let mut template = component.pod_template_spec.clone();
    template
        .metadata
        .get_or_insert_with(Default::default)
        .labels
        .get_or_insert_with(Default::default)
        .extend(component.selector_labels());
    template
}

fn container_ports(component: &ComponentValue) -> Vec<corev1::ContainerPort> {
    component
        .pod_template_spec
        .spec
        .iter()
        .flat_map(|pod| pod.containers.iter())
        .flat_map(|container| container.ports.iter().flatten())
        .cloned()
        .collect()
}

fn headless_service(component: &ComponentValue, service: &ServiceValue) -> corev1::Service {
    let ports = container_ports(component)
        .into_iter()
        .map(|port| corev1::ServicePort {
            name: port.name,
            port: port.container_port,
            protocol: port.protocol,
            ..Default::default()
        })
        .collect::<Vec<_>>();

    corev1::Service {
        metadata: metav1::ObjectMeta {
            name: Some(service.name.clone()),
            ..workload_metadata(component)
        },
        spec: Some(corev1::ServiceSpec {
            cluster_ip: Some("None".to_owned()),
            selector: Some(component.selector_labels()),
            ports: (!ports.is_empty()).then_some(ports),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn apply_service<S: Store>(store: &S, component: &ComponentValue) -> Result<(), context::Error> {
    if let Some(service) = &component.service {
        store.apply(&headless_service(component, service)).await?;
    }
    Ok(())
}

async fn delete_ignore_missing<S: Store, T: Object>(
    store: &S,
    name: &str,
    namespace: &str,
) -> Result<(), context::Error> {
    match store.delete::<T>(name, Some(namespace)).await {
        Err(e) if e.is_not_found() => {
            debug!("{} {}/{} already gone", T::kind(&()), namespace, name);
            Ok(())
        }
        other => other,
    }
}

/// Deletes the workload of kind `T` and the headless service of the component.
async fn destroy_workload<S: Store, T: Object>(
    store: &S,
    component: &ComponentValue,
) -> Result<(), context::Error> {
    // Service first: a missing workload means the component is fully gone.
    if let Some(service) = &component.service {
        delete_ignore_missing::<S, corev1::Service>(store, &service.name, &component.namespace)
            .await?;
    }
    delete_ignore_missing::<S, T>(store, &component.name, &component.namespace).await
}

async fn workload_exists<S: Store, T: Object>(
    store: &S,
    component: &ComponentValue,
) -> Result<bool, context::Error> {
    Ok(store
        .get::<T>(&component.name, Some(&component.namespace))
        .await
        .optional()?
        .is_some())
}

fn is_pod_ready(pod: &corev1::Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Ready pods of the component with their addresses and declared ports.
async fn topology_info<S: Store>(
    store: &S,
    component: &ComponentValue,
) -> Result<TopologyInfo, context::Error> {
    let ports = container_ports(component)
        .into_iter()
        .map(|port| PortConfig {
            name: port.name.unwrap_or_default(),
            port: port.container_port,
        })
        .collect::<Vec<_>>();

    let pods: Vec<corev1::Pod> = store
        .list(Some(&component.namespace), Some(&component.label_selector()))
        .await?;

    let mut pod_configs = pods
        .iter()
        .filter(|pod| is_pod_ready(pod))
        .map(|pod| {
            let status = pod.status.as_ref();
            PodConfig {
                pod_name: pod.metadata.name.clone().unwrap_or_default(),
                pod_ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
                host_ip: status.and_then(|s| s.host_ip.clone()).unwrap_or_default(),
                ports: ports.clone(),
            }
        })
        .collect::<Vec<_>>();
    pod_configs.sort_by(|a, b| a.pod_name.cmp(&b.pod_name));

    Ok(TopologyInfo {
        pod_configs,
        service: component.service.clone(),
    })
}
