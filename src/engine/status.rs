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

use super::lifecycle::set_observed;
use super::{CacheEngine, Error};
use crate::context::Store;
use crate::engine::value::RuntimeValue;
use crate::types::v1alpha1::cache_runtime::{CacheRuntime, Role};
use crate::types::v1alpha1::status::ComponentStatus;
use crate::utils::retry::{Target, update_with_retry};
use crate::utils::time::{format_duration, parse_time, rfc3339};
use kube::runtime::events::EventType;
use tracing::info;

impl<S: Store> CacheEngine<S> {
    /// Refreshes the status of every enabled component and reports whether the runtime
    /// can serve: master and worker usable, disabled ones counting as ready.
    ///
    /// The first ready observation fixes `setupDuration`; it is never recomputed.
    pub async fn check_and_update_runtime_status(&self, value: &RuntimeValue) -> Result<bool, Error> {
        let mut observed: Vec<(Role, ComponentStatus)> = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            let component = value.component(role);
            if !component.enabled {
                continue;
            }
            let status = self
                .helper(component)?
                .construct_component_status(component)
                .await?;
            observed.push((role, status));
        }

        let usable = |role: Role| {
            observed
                .iter()
                .find(|(r, _)| *r == role)
                .is_none_or(|(_, status)| status.phase.is_usable())
        };
        let ready = usable(Role::Master) && usable(Role::Worker);

        let now = chrono::Utc::now();
        let transition = rfc3339(now);
        let mut became_ready = false;
        let updated = update_with_retry(
            self.store.as_ref(),
            &self.backoff,
            &self.name,
            Some(&self.namespace),
            Target::Status,
            |runtime: &mut CacheRuntime| {
                let created = runtime
                    .metadata
                    .creation_timestamp
                    .as_ref()
                    .and_then(parse_time);
                let status = runtime.status.get_or_insert_with(Default::default);
                for (role, component) in &observed {
                    set_observed(status, *role, component, &transition);
                }

                became_ready = ready && status.setup_duration.is_none();
                if became_ready {
                    let elapsed = created
                        .map(|created| now - created)
                        .unwrap_or_else(chrono::Duration::zero);
                    status.setup_duration = Some(format_duration(elapsed));
                }
            },
        )
        .await?;

        if let Some(runtime) = updated.filter(|_| became_ready) {
            let duration = runtime
                .status
                .as_ref()
                .and_then(|s| s.setup_duration.clone())
                .unwrap_or_default();
            info!("runtime {} is ready after {}", self.id(), duration);
            self.record(
                &runtime,
                EventType::Normal,
                "RuntimeReady",
                &format!("The runtime is ready, setup took {duration}."),
            )
            .await;
        }

        Ok(ready)
    }
}
