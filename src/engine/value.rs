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

//! The merged, deployable model of a runtime. Rebuilt on every reconcile, never persisted.

use crate::types::v1alpha1::cache_runtime::Role;
use crate::types::v1alpha1::cache_runtime_class::WorkloadType;
use crate::types::v1alpha1::k8s::PlacementMode;
use crate::utils::labels::{CACHE_RUNTIME_COMPONENT_LABEL, CACHE_RUNTIME_NAME_LABEL};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeValue {
    pub fullname_override: String,
    pub owner_dataset_id: String,
    pub namespace: String,
    pub name: String,
    pub placement_mode: PlacementMode,
    pub master: ComponentValue,
    pub worker: ComponentValue,
    pub client: ComponentValue,
}

impl RuntimeValue {
    pub fn component(&self, role: Role) -> &ComponentValue {
        match role {
            Role::Master => &self.master,
            Role::Worker => &self.worker,
            Role::Client => &self.client,
        }
    }

    pub fn component_mut(&mut self, role: Role) -> &mut ComponentValue {
        match role {
            Role::Master => &mut self.master,
            Role::Worker => &mut self.worker,
            Role::Client => &mut self.client,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentValue {
    pub enabled: bool,
    pub name: String,
    pub namespace: String,
    pub runtime_name: String,
    pub role: Role,
    pub workload_type: WorkloadType,
    pub replicas: i32,
    pub pod_template_spec: corev1::PodTemplateSpec,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tiered_store: Vec<TieredStoreOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<metav1::OwnerReference>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub encrypt_option: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

impl ComponentValue {
    /// A component that is absent from the class or disabled by the runtime.
    pub fn disabled(role: Role, runtime_name: &str, namespace: &str) -> Self {
        Self {
            enabled: false,
            name: format!("{runtime_name}-{role}"),
            namespace: namespace.to_owned(),
            runtime_name: runtime_name.to_owned(),
            role,
            workload_type: WorkloadType::default(),
            replicas: 0,
            pod_template_spec: corev1::PodTemplateSpec::default(),
            options: BTreeMap::new(),
            tiered_store: vec![],
            service: None,
            owner: None,
            encrypt_option: BTreeMap::new(),
            node_selector: BTreeMap::new(),
            target_path: None,
        }
    }

    /// Labels selecting the pods of this component.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        [
            (CACHE_RUNTIME_NAME_LABEL.to_owned(), self.runtime_name.clone()),
            (CACHE_RUNTIME_COMPONENT_LABEL.to_owned(), self.name.clone()),
        ]
        .into_iter()
        .collect()
    }

    pub fn label_selector(&self) -> String {
        self.selector_labels()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One cache directory of an expanded tiered store.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredStoreOption {
    pub cache_dir: String,
    pub cache_capacity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
    /// Set for tiers living in the cache process memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_quantity_requirement: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceValue {
    pub name: String,
}
