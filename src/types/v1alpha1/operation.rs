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

//! One-shot data operations and the status they share.

use k8s_openapi::schemars::JsonSchema;
use kube::{CustomResource, KubeSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq, Hash)]
pub enum OperationKind {
    #[strum(to_string = "DataLoad")]
    DataLoad,

    #[strum(to_string = "DataMigrate")]
    DataMigrate,

    #[strum(to_string = "DataBackup")]
    DataBackup,

    #[strum(to_string = "DataProcess")]
    DataProcess,
}

/// Reference to the operation that has to complete first.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationRef {
    pub kind: OperationKind,

    /// Defaults to the namespace of the referring operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetDataset {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
pub enum OperationPhase {
    #[serde(rename = "")]
    #[strum(to_string = "None")]
    #[default]
    None,

    #[strum(to_string = "Pending")]
    Pending,

    #[strum(to_string = "Executing")]
    Executing,

    #[strum(to_string = "Complete")]
    Complete,

    #[strum(to_string = "Failed")]
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WaitingStatus {
    /// Set while the operation waits for its `runAfter` predecessor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_complete: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default)]
    pub phase: OperationPhase,

    #[serde(default)]
    pub waiting_for: WaitingStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "DataLoad",
    namespaced,
    status = "OperationStatus",
    derive = "PartialEq",
    plural = "dataloads",
    singular = "dataload",
    printcolumn = r#"{"name":"Dataset", "type":"string", "jsonPath":".spec.dataset.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct DataLoadSpec {
    pub dataset: TargetDataset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_after: Option<OperationRef>,

    #[serde(default)]
    pub load_metadata: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_paths: Vec<String>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "DataMigrate",
    namespaced,
    status = "OperationStatus",
    derive = "PartialEq",
    plural = "datamigrates",
    singular = "datamigrate",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct DataMigrateSpec {
    pub dataset: TargetDataset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_after: Option<OperationRef>,

    pub from: String,

    pub to: String,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "DataBackup",
    namespaced,
    status = "OperationStatus",
    derive = "PartialEq",
    plural = "databackups",
    singular = "databackup",
    printcolumn = r#"{"name":"Dataset", "type":"string", "jsonPath":".spec.dataset.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct DataBackupSpec {
    pub dataset: TargetDataset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_after: Option<OperationRef>,

    pub backup_path: String,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "data.fluid.io",
    version = "v1alpha1",
    kind = "DataProcess",
    namespaced,
    status = "OperationStatus",
    derive = "PartialEq",
    plural = "dataprocesses",
    singular = "dataprocess",
    printcolumn = r#"{"name":"Dataset", "type":"string", "jsonPath":".spec.dataset.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct DataProcessSpec {
    pub dataset: TargetDataset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_after: Option<OperationRef>,

    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}
