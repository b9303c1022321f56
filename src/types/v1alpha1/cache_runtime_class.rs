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

use crate::types::v1alpha1::cache_runtime::Role;
use k8s_openapi::api::core::v1 as corev1;
use kube::{CustomResource, KubeSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vendor template describing which components a runtime type has and their base pod shape.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "CacheRuntimeClass",
    derive = "PartialEq",
    shortname = "cacheclass",
    plural = "cacheruntimeclasses",
    singular = "cacheruntimeclass",
    printcolumn = r#"{"name":"FileSystem", "type":"string", "jsonPath":".spec.fileSystemType"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct CacheRuntimeClassSpec {
    /// Mount type handed to the CSI driver.
    pub file_system_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<ComponentDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<ComponentDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ComponentDefinition>,
}

impl Topology {
    pub fn component(&self, role: Role) -> Option<&ComponentDefinition> {
        match role {
            Role::Master => self.master.as_ref(),
            Role::Worker => self.worker.as_ref(),
            Role::Client => self.client.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_none() && self.worker.is_none() && self.client.is_none()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    pub workload_type: WorkloadType,

    pub pod_template_spec: corev1::PodTemplateSpec,

    /// Default options, overridden by the runtime.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    #[serde(default)]
    pub service: ServiceDefinition,

    #[serde(default)]
    pub dependencies: Dependencies,
}

/// Group/version/kind of the workload driving a component, e.g. `apps/v1` `StatefulSet`.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadType {
    #[serde(default)]
    pub api_version: String,

    pub kind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<HeadlessService>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
pub struct HeadlessService {}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    /// Mount the dataset's encrypt-option secrets into every container of the component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt_option: Option<EncryptOptionDependency>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
pub struct EncryptOptionDependency {}
