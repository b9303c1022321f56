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

use super::{CacheEngine, Error};
use crate::context::{self, NotFoundExt, Store};
use crate::engine::value::{ComponentValue, ServiceValue};
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, Role};
use crate::utils::labels::{EXCLUSIVE_LABEL, RuntimeLabels};
use crate::utils::retry::{Target, update_with_retry};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// Runtime specific steps of teardown.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ShutdownHooks: Send + Sync {
    /// Drops the cached data before the workers go away.
    async fn clean_cache(&self, runtime: &CacheRuntime) -> Result<(), context::Error>;
}

/// For runtimes whose cache dies with its pods.
pub struct NoopHooks;

#[async_trait]
impl ShutdownHooks for NoopHooks {
    async fn clean_cache(&self, _runtime: &CacheRuntime) -> Result<(), context::Error> {
        Ok(())
    }
}

impl<S: Store> CacheEngine<S> {
    /// Tears the runtime down. Every step is idempotent so a failed pass is simply retried.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let runtime = self.runtime().await?;

        self.clean_cache(&runtime).await?;
        self.destroy_components(&runtime).await?;
        self.clean_node_labels(&runtime).await?;
        self.clean_generated_resources(&runtime).await?;

        info!("runtime {} shut down", self.id());
        Ok(())
    }

    /// Gives up on cache cleaning once the graceful budget is spent.
    async fn clean_cache(&self, runtime: &CacheRuntime) -> Result<(), Error> {
        let failed = self.retry_shutdown.load(Ordering::SeqCst);
        if failed >= self.graceful_shutdown_limits {
            warn!(
                "skipping cache clean of {} after {} failed attempts",
                self.id(),
                failed
            );
            return Ok(());
        }

        if let Err(source) = self.hooks.clean_cache(runtime).await {
            let attempt = self.retry_shutdown.fetch_add(1, Ordering::SeqCst) + 1;
            return Err(Error::CleanCache {
                name: self.id(),
                attempt,
                source,
            });
        }
        Ok(())
    }

    /// Client first, master last. Without the class the owner references are left to
    /// garbage-collect the workloads.
    async fn destroy_components(&self, runtime: &CacheRuntime) -> Result<(), Error> {
        let Some(class) = self.runtime_class(runtime).await.optional()? else {
            info!(
                "runtime class {} of {} not found, skipping component teardown",
                runtime.spec.runtime_class_name,
                self.id()
            );
            return Ok(());
        };
        let Some(topology) = class.spec.topology.as_ref() else {
            return Ok(());
        };

        for role in Role::ALL.into_iter().rev() {
            let Some(definition) = topology.component(role) else {
                continue;
            };
            let mut component = ComponentValue::disabled(role, &self.name, &self.namespace);
            component.workload_type = definition.workload_type.clone();
            if definition.service.headless.is_some() {
                component.service = Some(ServiceValue {
                    name: component.name.clone(),
                });
            }

            let helper = self.helper(&component)?;
            if !helper.check_component_exist(&component).await? {
                debug!("{} of runtime {} already gone", role, self.id());
                continue;
            }
            debug!("destroying {} of runtime {}", role, self.id());
            helper.destroy(&component).await?;
        }
        Ok(())
    }

    /// Removes this runtime's labels from every node it was scheduled on.
    ///
    /// The exclusivity label is only removed when it names this dataset, so a node claimed
    /// by another dataset in the meantime keeps its claim.
    async fn clean_node_labels(&self, runtime: &CacheRuntime) -> Result<(), Error> {
        let labels = RuntimeLabels::new(&self.namespace, &self.name, &runtime.owner_uid());
        let keys = [labels.runtime(), labels.common(), labels.fuse()];
        let exclusive = labels.exclusive_value();

        let _guard = self.node_label_lock.lock().await;
        let nodes: Vec<corev1::Node> = self.store.list(None, Some(&labels.fuse())).await?;

        for node in nodes {
            let node_name = node.name_any();
            let updated = update_with_retry(
                self.store.as_ref(),
                &self.backoff,
                &node_name,
                None,
                Target::Object,
                |node: &mut corev1::Node| {
                    let Some(node_labels) = node.metadata.labels.as_mut() else {
                        return;
                    };
                    for key in &keys {
                        node_labels.remove(key);
                    }
                    if node_labels.get(EXCLUSIVE_LABEL) == Some(&exclusive) {
                        node_labels.remove(EXCLUSIVE_LABEL);
                    }
                },
            )
            .await
            .optional()?;

            if updated.is_some() {
                debug!("removed labels of runtime {} from node {}", self.id(), node_name);
            }
        }
        Ok(())
    }

    async fn clean_generated_resources(&self, runtime: &CacheRuntime) -> Result<(), Error> {
        let config_map = runtime.config_map_name();
        match self
            .store
            .delete::<corev1::ConfigMap>(&config_map, Some(&self.namespace))
            .await
        {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => Ok(()),
        }
    }
}
