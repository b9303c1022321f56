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

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::k8s;
use crate::types::v1alpha1::status::ConditionType;
use k8s_openapi::Resource as _;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::BTreeMap;
use strum::Display;

pub const FINALIZER: &str = "fluid-dataset-controller-finalizer";

const CONFIG_MAP_SUFFIX: &str = "runtimeset";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "CacheRuntime",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    derive = "PartialEq",
    shortname = "cache",
    plural = "cacheruntimes",
    singular = "cacheruntime",
    printcolumn = r#"{"name":"Master", "type":"string", "jsonPath":".status.master.phase"}"#,
    printcolumn = r#"{"name":"Worker", "type":"string", "jsonPath":".status.worker.phase"}"#,
    printcolumn = r#"{"name":"Client", "type":"string", "jsonPath":".status.client.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct CacheRuntimeSpec {
    /// Name of the cluster scoped CacheRuntimeClass providing the component templates.
    pub runtime_class_name: String,

    #[serde(default)]
    pub master: ComponentSpec,

    #[serde(default)]
    pub worker: ComponentSpec,

    #[serde(default)]
    pub client: ComponentSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<corev1::LocalObjectReference>,

    #[serde(default)]
    pub pod_metadata: PodMetadata,

    /// Options shared by every component, overridden by component options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<corev1::Volume>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default)]
    pub disabled: bool,

    /// Defaults to 1. Ignored by node-wide workloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub runtime_version: VersionSpec,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    #[serde(default)]
    pub pod_metadata: PodMetadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<corev1::VolumeMount>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiered_store: Option<TieredStore>,
}

impl ComponentSpec {
    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<k8s::ImagePullPolicy>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TieredStore {
    #[serde(default)]
    pub levels: Vec<TieredStoreLevel>,
}

/// One cache tier. `path` and `quota` are comma separated lists of equal length.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TieredStoreLevel {
    #[serde(default)]
    pub medium: Medium,

    pub path: String,

    pub quota: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
}

/// Backing of a tier: either the cache process memory itself or a pod volume.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medium {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_memory: Option<ProcessMemory>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<MediumVolume>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
pub struct ProcessMemory {}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediumVolume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<corev1::HostPathVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<corev1::EmptyDirVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<corev1::EphemeralVolumeSource>,
}

/// The three independently scaled parts of a cache runtime.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[strum(to_string = "master")]
    Master,

    #[strum(to_string = "worker")]
    Worker,

    #[strum(to_string = "client")]
    Client,
}

impl Role {
    /// Setup order. A weaker component is never set up before a stronger one.
    pub const ALL: [Role; 3] = [Role::Master, Role::Worker, Role::Client];

    pub fn initialized_condition(self) -> ConditionType {
        match self {
            Role::Master => ConditionType::MasterInitialized,
            Role::Worker => ConditionType::WorkersInitialized,
            Role::Client => ConditionType::FusesInitialized,
        }
    }

    pub fn ready_condition(self) -> ConditionType {
        match self {
            Role::Master => ConditionType::MasterReady,
            Role::Worker => ConditionType::WorkersReady,
            Role::Client => ConditionType::FusesReady,
        }
    }
}

impl CacheRuntime {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    pub fn component(&self, role: Role) -> &ComponentSpec {
        match role {
            Role::Master => &self.spec.master,
            Role::Worker => &self.spec.worker,
            Role::Client => &self.spec.client,
        }
    }

    /// UID of the owning dataset when the runtime is owned by one, its own UID otherwise.
    pub fn owner_uid(&self) -> String {
        self.owner_references()
            .iter()
            .find(|owner| owner.kind == "Dataset")
            .map(|owner| owner.uid.clone())
            .or_else(|| self.uid())
            .unwrap_or_default()
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-{}", self.name(), CONFIG_MAP_SUFFIX)
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// a new owner reference for the runtime
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}
