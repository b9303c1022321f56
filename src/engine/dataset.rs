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
use crate::context::{NotFoundExt, Store};
use crate::types::v1alpha1::dataset::{ACCELERATE_CATEGORY, Dataset, DatasetPhase, RuntimeRef};
use crate::types::v1alpha1::status::{Condition, ConditionType, condition};
use crate::utils::labels::RUNTIME_TYPE;
use crate::utils::retry::{Target, update_with_retry};
use crate::utils::time::rfc3339;
use kube::runtime::events::EventType;
use tracing::{debug, info};

impl<S: Store> CacheEngine<S> {
    fn runtime_ref(&self) -> RuntimeRef {
        RuntimeRef {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            category: ACCELERATE_CATEGORY.to_owned(),
            type_: RUNTIME_TYPE.to_owned(),
        }
    }

    /// Marks the dataset as served by this runtime.
    ///
    /// Mounts are snapshotted on the first binding only, and a dataset already holding an
    /// accelerate runtime keeps it.
    pub async fn bind_to_dataset(&self) -> Result<(), Error> {
        let runtime_ref = self.runtime_ref();
        let now = rfc3339(chrono::Utc::now());

        let updated = update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Status,
            |dataset: &mut Dataset| {
                let mounts = dataset.spec.mounts.clone();
                let status = dataset.status.get_or_insert_with(Default::default);

                status.phase = DatasetPhase::Bound;
                if status.mounts.is_empty() {
                    status.mounts = mounts;
                }
                if !status
                    .runtimes
                    .iter()
                    .any(|r| r.category == runtime_ref.category)
                {
                    status.runtimes.push(runtime_ref.clone());
                }
                condition::upsert(
                    &mut status.conditions,
                    Condition::new(
                        ConditionType::Ready,
                        true,
                        "The ddc runtime is ready.",
                        &now,
                    ),
                );
            },
        )
        .await?;

        if let Some(dataset) = updated {
            info!("dataset {} bound to its cache runtime", self.id());
            self.record(
                &dataset,
                EventType::Normal,
                "DatasetBound",
                "The dataset is bound to the cache runtime.",
            )
            .await;
        }
        Ok(())
    }

    /// Releases the dataset on runtime deletion. A dataset already gone is fine.
    pub async fn unbind_from_dataset(&self) -> Result<(), Error> {
        let name = self.name.clone();
        let result = update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Status,
            |dataset: &mut Dataset| {
                let Some(status) = dataset.status.as_mut() else {
                    return;
                };
                let before = status.runtimes.len();
                status
                    .runtimes
                    .retain(|r| !(r.category == ACCELERATE_CATEGORY && r.name == name));
                if before == status.runtimes.len() {
                    return;
                }
                status.phase = DatasetPhase::NotBound;
                status.mounts.clear();
                status
                    .conditions
                    .retain(|c| c.type_ != ConditionType::Ready.to_string());
            },
        )
        .await
        .optional()?;

        match result {
            None => debug!("dataset {} already gone", self.id()),
            Some(None) => debug!("dataset {} not bound to the runtime", self.id()),
            Some(Some(_)) => info!("runtime {} unbound from its dataset", self.id()),
        }
        Ok(())
    }
}
