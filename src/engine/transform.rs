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

//! Merges the runtime class, the dataset and the runtime into a [`RuntimeValue`].
//!
//! Precedence per component, lowest first: runtime class template and default options,
//! common config, runtime overrides. Scalars are overwritten, lists are appended.

mod client;
mod common;
mod tiered_store;
mod worker;

use crate::engine::value::{ComponentValue, RuntimeValue, ServiceValue};
use crate::types::error::{
    EmptyTopologySnafu, Error, InvalidQuantitySnafu, MissingTopologySnafu, NoContainerSnafu,
};
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, ComponentSpec, Role};
use crate::types::v1alpha1::cache_runtime_class::{CacheRuntimeClass, Topology};
use crate::types::v1alpha1::dataset::Dataset;
use crate::utils::labels::RuntimeLabels;
use crate::utils::merge::union_with_override;
use crate::utils::quantity;
use common::CommonConfig;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use snafu::{OptionExt, ensure};
use tracing::debug;

const RUNTIME_CONFIG_DIR: &str = "/etc/fluid/runtime";

pub const RUNTIME_CONFIG_FILE: &str = "config.json";

const RUNTIME_CONFIG_VOLUME: &str = "runtime-config";

const TARGET_PATH_ROOT: &str = "/runtime-mnt/cache";

const PATCHABLE_RESOURCES: [&str; 2] = ["cpu", "memory"];

/// Well-known locations of a runtime's generated config and fuse mount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimePaths {
    pub config_map: String,
    pub config_dir: String,
    pub config_path: String,
    pub target_path: String,
}

impl RuntimePaths {
    pub fn new(runtime: &CacheRuntime, namespace: &str) -> Self {
        Self {
            config_map: runtime.config_map_name(),
            config_dir: RUNTIME_CONFIG_DIR.to_owned(),
            config_path: format!("{RUNTIME_CONFIG_DIR}/{RUNTIME_CONFIG_FILE}"),
            target_path: format!(
                "{TARGET_PATH_ROOT}/{namespace}/{}/cache-fuse",
                runtime.name()
            ),
        }
    }
}

/// Fails on a class without topology or components; nothing is merged before this holds.
fn precheck(class: &CacheRuntimeClass) -> Result<&Topology, Error> {
    let class_name = class.name_any();
    let topology = class.spec.topology.as_ref().context(MissingTopologySnafu {
        class: class_name.clone(),
    })?;
    ensure!(!topology.is_empty(), EmptyTopologySnafu { class: class_name });
    Ok(topology)
}

pub fn transform(
    dataset: &Dataset,
    runtime: &CacheRuntime,
    class: &CacheRuntimeClass,
) -> Result<RuntimeValue, Error> {
    let topology = precheck(class)?;
    let namespace = runtime.namespace()?;
    let name = runtime.name();
    let labels = RuntimeLabels::new(&namespace, &name, &runtime.owner_uid());
    let paths = RuntimePaths::new(runtime, &namespace);

    let transformer = Transformer {
        dataset,
        runtime,
        class_name: class.name_any(),
        topology,
        common: CommonConfig::new(dataset, runtime, &paths),
        labels: labels.clone(),
        paths,
        namespace: namespace.clone(),
        name: name.clone(),
    };

    let value = RuntimeValue {
        fullname_override: name.clone(),
        owner_dataset_id: labels.dataset_id(),
        placement_mode: dataset.placement_mode(),
        master: transformer.component(Role::Master)?,
        worker: transformer.component(Role::Worker)?,
        client: transformer.component(Role::Client)?,
        namespace,
        name,
    };

    debug!(
        "transformed runtime {}/{}: master={} worker={} client={}",
        value.namespace, value.name, value.master.enabled, value.worker.enabled, value.client.enabled
    );
    Ok(value)
}

struct Transformer<'a> {
    dataset: &'a Dataset,
    runtime: &'a CacheRuntime,
    class_name: String,
    topology: &'a Topology,
    common: CommonConfig,
    labels: RuntimeLabels,
    paths: RuntimePaths,
    namespace: String,
    name: String,
}

impl Transformer<'_> {
    fn component(&self, role: Role) -> Result<ComponentValue, Error> {
        let mut value = ComponentValue::disabled(role, &self.name, &self.namespace);
        let spec = self.runtime.component(role);

        let Some(definition) = self.topology.component(role) else {
            return Ok(value);
        };
        if spec.disabled {
            return Ok(value);
        }

        let has_container = definition
            .pod_template_spec
            .spec
            .as_ref()
            .is_some_and(|pod| !pod.containers.is_empty());
        ensure!(
            has_container,
            NoContainerSnafu {
                class: self.class_name.clone(),
                component: role.to_string(),
            }
        );

        value.enabled = true;
        value.workload_type = definition.workload_type.clone();
        value.pod_template_spec = definition.pod_template_spec.clone();
        if definition.service.headless.is_some() {
            value.service = Some(ServiceValue {
                name: value.name.clone(),
            });
        }

        self.common.apply(definition, &mut value);
        self.apply_runtime(spec, &mut value)?;

        match role {
            Role::Master => {}
            Role::Worker => worker::set_affinity(&mut value, self.dataset, &self.labels),
            Role::Client => client::apply(&mut value, spec, &self.paths, &self.labels),
        }

        Ok(value)
    }

    fn apply_runtime(&self, spec: &ComponentSpec, value: &mut ComponentValue) -> Result<(), Error> {
        let runtime_spec = &self.runtime.spec;
        let common_envs = self.common_envs(value.role);
        let template = &mut value.pod_template_spec;
        let pod = template.spec.get_or_insert_with(Default::default);

        if let Some(container) = pod.containers.first_mut() {
            let version = &spec.runtime_version;
            if !version.image.is_empty() {
                container.image = Some(if version.image_tag.is_empty() {
                    version.image.clone()
                } else {
                    format!("{}:{}", version.image, version.image_tag)
                });
            }
            if let Some(policy) = &version.image_pull_policy {
                container.image_pull_policy = Some(policy.to_string());
            }

            let env = container.env.get_or_insert_with(Vec::new);
            env.extend(spec.env.iter().map(|(name, value)| corev1::EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            }));
            env.extend(common_envs);

            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .extend(spec.volume_mounts.iter().cloned());

            patch_resources(container, spec.resources.as_ref());
        }

        if !runtime_spec.image_pull_secrets.is_empty() {
            pod.image_pull_secrets = Some(runtime_spec.image_pull_secrets.clone());
        }
        if !spec.node_selector.is_empty() {
            pod.node_selector = Some(spec.node_selector.clone());
        }
        pod.volumes
            .get_or_insert_with(Vec::new)
            .extend(runtime_spec.volumes.iter().cloned());

        if let Some(tiered_store) = spec.tiered_store.as_ref().filter(|t| !t.levels.is_empty()) {
            let expanded = tiered_store::expand(&tiered_store.levels)?;
            pod.volumes
                .get_or_insert_with(Vec::new)
                .extend(expanded.volumes);
            if let Some(container) = pod.containers.first_mut() {
                container
                    .volume_mounts
                    .get_or_insert_with(Vec::new)
                    .extend(expanded.volume_mounts);
                for requirement in expanded
                    .options
                    .iter()
                    .filter_map(|o| o.mem_quantity_requirement.as_deref())
                {
                    add_memory_request(container, requirement)?;
                }
            }
            value.tiered_store = expanded.options;
        }

        let metadata = template.metadata.get_or_insert_with(Default::default);
        for pod_metadata in [&runtime_spec.pod_metadata, &spec.pod_metadata] {
            if !pod_metadata.annotations.is_empty() {
                let merged = union_with_override(
                    &metadata.annotations.clone().unwrap_or_default(),
                    &pod_metadata.annotations,
                );
                metadata.annotations = Some(merged);
            }
            if !pod_metadata.labels.is_empty() {
                let merged = union_with_override(
                    &metadata.labels.clone().unwrap_or_default(),
                    &pod_metadata.labels,
                );
                metadata.labels = Some(merged);
            }
        }

        value.replicas = spec.replicas();
        value.options = union_with_override(&value.options, &spec.options);
        Ok(())
    }

    /// Appended after every user supplied variable.
    fn common_envs(&self, role: Role) -> Vec<corev1::EnvVar> {
        [
            ("FLUID_DATASET_NAME", self.name.clone()),
            ("FLUID_DATASET_NAMESPACE", self.namespace.clone()),
            ("FLUID_RUNTIME_CONFIG_PATH", self.paths.config_path.clone()),
            ("FLUID_RUNTIME_MOUNT_PATH", self.paths.target_path.clone()),
            ("FLUID_RUNTIME_COMPONENT_TYPE", role.to_string()),
        ]
        .into_iter()
        .map(|(name, value)| corev1::EnvVar {
            name: name.to_owned(),
            value: Some(value),
            ..Default::default()
        })
        .collect()
    }
}

/// Overrides cpu and memory per key, limits and requests independently.
fn patch_resources(container: &mut corev1::Container, overrides: Option<&corev1::ResourceRequirements>) {
    let Some(overrides) = overrides else {
        return;
    };
    let resources = container.resources.get_or_insert_with(Default::default);

    for key in PATCHABLE_RESOURCES {
        if let Some(limit) = overrides.limits.as_ref().and_then(|l| l.get(key)) {
            resources
                .limits
                .get_or_insert_with(Default::default)
                .insert(key.to_owned(), limit.clone());
        }
        if let Some(request) = overrides.requests.as_ref().and_then(|r| r.get(key)) {
            resources
                .requests
                .get_or_insert_with(Default::default)
                .insert(key.to_owned(), request.clone());
        }
    }
}

fn add_memory_request(container: &mut corev1::Container, requirement: &str) -> Result<(), Error> {
    let requests = container
        .resources
        .get_or_insert_with(Default::default)
        .requests
        .get_or_insert_with(Default::default);
    let requirement = Quantity(requirement.to_owned());

    let total = match requests.get("memory") {
        Some(existing) => quantity::add(existing, &requirement).context(InvalidQuantitySnafu {
            field: "resources.requests.memory",
            value: existing.0.clone(),
        })?,
        None => requirement,
    };
    requests.insert("memory".to_owned(), total);
    Ok(())
}
