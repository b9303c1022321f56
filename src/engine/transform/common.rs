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

use super::{RUNTIME_CONFIG_VOLUME, RuntimePaths};
use crate::engine::value::ComponentValue;
use crate::types::v1alpha1::cache_runtime::CacheRuntime;
use crate::types::v1alpha1::cache_runtime_class::ComponentDefinition;
use crate::types::v1alpha1::dataset::Dataset;
use crate::utils::merge::{
    append_or_override_volume, append_or_override_volume_mount, union_with_override,
};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;

const ENCRYPT_OPTION_DIR: &str = "/etc/fluid/secrets";

const ENCRYPT_OPTION_VOLUME_PREFIX: &str = "encrypt-opt-";

/// Secret volumes backing the dataset's encrypt options.
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct EncryptOptionConfig {
    pub volumes: Vec<corev1::Volume>,
    pub volume_mounts: Vec<corev1::VolumeMount>,
    /// option name -> file holding the secret value
    pub paths: BTreeMap<String, String>,
}

impl EncryptOptionConfig {
    fn new(dataset: &Dataset) -> Self {
        let mut config = Self::default();

        for mount in dataset.spec.mounts.iter().filter(|m| !m.is_native()) {
            for option in dataset
                .spec
                .shared_encrypt_options
                .iter()
                .chain(mount.encrypt_options.iter())
            {
                let secret = &option.value_from.secret_key_ref;
                let volume_name = format!("{ENCRYPT_OPTION_VOLUME_PREFIX}{}", secret.name);
                let mount_path = format!("{ENCRYPT_OPTION_DIR}/{}", secret.name);

                append_or_override_volume(
                    &mut config.volumes,
                    corev1::Volume {
                        name: volume_name.clone(),
                        secret: Some(corev1::SecretVolumeSource {
                            secret_name: Some(secret.name.clone()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                );
                append_or_override_volume_mount(
                    &mut config.volume_mounts,
                    corev1::VolumeMount {
                        name: volume_name,
                        mount_path: mount_path.clone(),
                        read_only: Some(true),
                        ..Default::default()
                    },
                );
                config
                    .paths
                    .insert(option.name.clone(), format!("{mount_path}/{}", secret.key));
            }
        }

        config
    }
}

/// Settings every enabled component receives regardless of role.
#[derive(Clone, Debug)]
pub(super) struct CommonConfig {
    owner: metav1::OwnerReference,
    image_pull_secrets: Vec<corev1::LocalObjectReference>,
    tolerations: Vec<corev1::Toleration>,
    options: BTreeMap<String, String>,
    config_map: String,
    config_dir: String,
    encrypt: EncryptOptionConfig,
}

impl CommonConfig {
    pub fn new(dataset: &Dataset, runtime: &CacheRuntime, paths: &RuntimePaths) -> Self {
        Self {
            owner: runtime.new_owner_ref(),
            image_pull_secrets: runtime.spec.image_pull_secrets.clone(),
            tolerations: dataset
                .spec
                .tolerations
                .iter()
                .cloned()
                .map(|toleration| corev1::Toleration {
                    toleration_seconds: None,
                    ..toleration
                })
                .collect(),
            options: runtime.spec.options.clone(),
            config_map: paths.config_map.clone(),
            config_dir: paths.config_dir.clone(),
            encrypt: EncryptOptionConfig::new(dataset),
        }
    }

    pub fn apply(&self, definition: &ComponentDefinition, value: &mut ComponentValue) {
        value.owner = Some(self.owner.clone());
        value.options = union_with_override(&definition.options, &self.options);

        let pod = value
            .pod_template_spec
            .spec
            .get_or_insert_with(Default::default);

        pod.image_pull_secrets
            .get_or_insert_with(Vec::new)
            .extend(self.image_pull_secrets.iter().cloned());
        pod.tolerations
            .get_or_insert_with(Vec::new)
            .extend(self.tolerations.iter().cloned());

        let volumes = pod.volumes.get_or_insert_with(Vec::new);
        append_or_override_volume(
            volumes,
            corev1::Volume {
                name: RUNTIME_CONFIG_VOLUME.to_owned(),
                config_map: Some(corev1::ConfigMapVolumeSource {
                    name: self.config_map.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        if let Some(container) = pod.containers.first_mut() {
            append_or_override_volume_mount(
                container.volume_mounts.get_or_insert_with(Vec::new),
                corev1::VolumeMount {
                    name: RUNTIME_CONFIG_VOLUME.to_owned(),
                    mount_path: self.config_dir.clone(),
                    read_only: Some(true),
                    ..Default::default()
                },
            );
        }

        if definition.dependencies.encrypt_option.is_none() {
            return;
        }
        for volume in &self.encrypt.volumes {
            append_or_override_volume(volumes, volume.clone());
        }
        for container in pod.containers.iter_mut() {
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            for mount in &self.encrypt.volume_mounts {
                append_or_override_volume_mount(mounts, mount.clone());
            }
        }
        value.encrypt_option = self.encrypt.paths.clone();
    }
}
