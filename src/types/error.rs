// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use snafu::Snafu;

/// Validation failures of the user and vendor descriptors.
///
/// None of these are retried locally: the descriptor has to change first.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("object has no namespace associated"))]
    NoNamespace,

    #[snafu(display("topology in cacheRuntimeClass '{}' is null", class))]
    MissingTopology { class: String },

    #[snafu(display(
        "at least one component should be defined in cacheRuntimeClass '{}'",
        class
    ))]
    EmptyTopology { class: String },

    #[snafu(display(
        "pod template of component '{}' in cacheRuntimeClass '{}' has no container",
        component,
        class
    ))]
    NoContainer { class: String, component: String },

    #[snafu(display(
        "tiered store level {} has {} paths but {} quotas ('{}' vs '{}')",
        level,
        paths,
        quotas,
        path,
        quota
    ))]
    TieredStoreMismatch {
        level: usize,
        paths: usize,
        quotas: usize,
        path: String,
        quota: String,
    },

    #[snafu(display("invalid quantity '{}' in {}", value, field))]
    InvalidQuantity { field: String, value: String },

    #[snafu(display("workload type '{}/{}' is not supported", api_version, kind))]
    UnsupportedWorkloadType { api_version: String, kind: String },

    #[snafu(display("serde_json error: {}", source))]
    SerdeJson { source: serde_json::Error },
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::SerdeJson { source }
    }
}
