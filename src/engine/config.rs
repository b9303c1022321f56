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

use super::{CacheEngine, EncodeConfigSnafu, Error};
use crate::component_helper::TopologyInfo;
use crate::context::Store;
use crate::engine::transform::RUNTIME_CONFIG_FILE;
use crate::engine::value::{ComponentValue, RuntimeValue, TieredStoreOption};
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, Role};
use crate::types::v1alpha1::dataset::{Dataset, Mount};
use crate::utils::labels::{CACHE_RUNTIME_NAME_LABEL, expected_annotations};
use crate::utils::retry::{Target, update_with_retry};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::Serialize;
use snafu::ResultExt;
use std::collections::BTreeMap;
use tracing::debug;

/// What the cache processes read from `config.json` at startup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeConfig<'a> {
    mounts: Vec<MountConfig<'a>>,
    access_modes: &'a [String],
    master: ComponentConfig<'a>,
    worker: ComponentConfig<'a>,
    client: ComponentConfig<'a>,
    topology: BTreeMap<Role, TopologyInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MountConfig<'a> {
    mount_point: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    options: &'a BTreeMap<String, String>,
    name: &'a str,
    path: String,
    read_only: bool,
    shared: bool,
}

impl<'a> From<&'a Mount> for MountConfig<'a> {
    fn from(mount: &'a Mount) -> Self {
        Self {
            mount_point: &mount.mount_point,
            options: &mount.options,
            name: &mount.name,
            path: mount
                .path
                .clone()
                .unwrap_or_else(|| format!("/{}", mount.name)),
            read_only: mount.read_only,
            shared: mount.shared,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComponentConfig<'a> {
    enabled: bool,
    name: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    options: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tiered_store: &'a Vec<TieredStoreOption>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    encrypt_option: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a ComponentValue> for ComponentConfig<'a> {
    fn from(component: &'a ComponentValue) -> Self {
        Self {
            enabled: component.enabled,
            name: &component.name,
            options: &component.options,
            target_path: component.target_path.as_deref(),
            tiered_store: &component.tiered_store,
            encrypt_option: &component.encrypt_option,
        }
    }
}

impl<S: Store> CacheEngine<S> {
    /// Publishes the runtime config and the reachable pods of every enabled component.
    ///
    /// Rewritten on every pass; an unchanged config map is not written again.
    pub(crate) async fn sync_config(
        &self,
        runtime: &CacheRuntime,
        dataset: &Dataset,
        value: &RuntimeValue,
    ) -> Result<(), Error> {
        let mut topology = BTreeMap::new();
        for role in Role::ALL {
            let component = value.component(role);
            if !component.enabled {
                continue;
            }
            let info = self
                .helper(component)?
                .get_component_topology_info(component)
                .await?;
            topology.insert(role, info);
        }

        let config = RuntimeConfig {
            mounts: dataset.spec.mounts.iter().map(MountConfig::from).collect(),
            access_modes: &dataset.spec.access_modes,
            master: (&value.master).into(),
            worker: (&value.worker).into(),
            client: (&value.client).into(),
            topology,
        };
        let content = serde_json::to_string(&config).context(EncodeConfigSnafu)?;

        let name = runtime.config_map_name();
        let config_map = corev1::ConfigMap {
            metadata: metav1::ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    CACHE_RUNTIME_NAME_LABEL.to_owned(),
                    self.name.clone(),
                )])),
                annotations: Some(expected_annotations()),
                owner_references: Some(vec![runtime.new_owner_ref()]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(RUNTIME_CONFIG_FILE.to_owned(), content)])),
            ..Default::default()
        };
        self.store.apply(&config_map).await?;
        debug!("synced runtime config {} of {}", name, self.id());

        update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Status,
            |runtime: &mut CacheRuntime| {
                runtime.status.get_or_insert_with(Default::default).value_file = Some(name.clone());
            },
        )
        .await?;
        Ok(())
    }
}
