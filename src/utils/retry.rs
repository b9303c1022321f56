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

//! Optimistic read-copy-mutate-write with bounded exponential backoff.

use crate::context::{Error, Object, Store};
use kube::ResourceExt;
use std::time::Duration;
use tracing::debug;

/// Retry schedule for conflicting writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    /// Total number of attempts.
    pub steps: u32,
    pub duration: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: 10,
            duration: Duration::from_millis(10),
            factor: 2,
            cap: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    fn next(&self, delay: Duration) -> Duration {
        (delay * self.factor).min(self.cap)
    }
}

/// Which part of the object a mutation is written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Object,
    Status,
}

/// Re-reads the object, applies `mutate` to a copy and writes it back when it changed.
///
/// Conflicts are retried following `backoff`; every other error is returned as is.
/// Returns `None` when the mutation left the object untouched and nothing was written.
pub async fn update_with_retry<S, T, F>(
    store: &S,
    backoff: &Backoff,
    name: &str,
    namespace: Option<&str>,
    target: Target,
    mut mutate: F,
) -> Result<Option<T>, Error>
where
    S: Store,
    T: Object,
    F: FnMut(&mut T) + Send,
{
    let mut delay = backoff.duration;
    let mut attempt = 1;

    loop {
        let current: T = store.get(name, namespace).await?;
        let mut desired = current.clone();
        mutate(&mut desired);

        if desired == current {
            return Ok(None);
        }

        let result = match target {
            Target::Object => store.replace(&desired).await,
            Target::Status => store.replace_status(&desired).await,
        };

        match result {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) if e.is_conflict() && attempt < backoff.steps => {
                debug!(
                    "conflict updating {} {}, retry {} in {:?}",
                    T::kind(&()),
                    current.name_any(),
                    attempt,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = backoff.next(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::FakeStore;
    use k8s_openapi::api::core::v1 as corev1;

    fn labelled_node(name: &str) -> corev1::Node {
        let mut node = crate::tests::create_test_node(name);
        node.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("zone".to_string(), "a".to_string());
        node
    }

    // Test: conflicts are retried until the write lands
    #[tokio::test(start_paused = true)]
    async fn test_retries_conflicts() {
        let store = FakeStore::default();
        store.insert(labelled_node("node-1"));
        store.inject_conflicts(3);

        let updated: Option<corev1::Node> = update_with_retry(
            &store,
            &Backoff::default(),
            "node-1",
            None,
            Target::Object,
            |node: &mut corev1::Node| {
                node.metadata
                    .labels
                    .get_or_insert_with(Default::default)
                    .insert("zone".to_string(), "b".to_string());
            },
        )
        .await
        .expect("update should succeed after conflicts");

        assert!(updated.is_some());
        let node: corev1::Node = store.get("node-1", None).await.unwrap();
        assert_eq!(node.labels().get("zone").map(String::as_str), Some("b"));
        assert_eq!(store.writes(), 1, "only the successful write should count");
    }

    // Test: the step budget bounds the retries
    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let store = FakeStore::default();
        store.insert(labelled_node("node-1"));
        store.inject_conflicts(100);

        let result: Result<Option<corev1::Node>, Error> = update_with_retry(
            &store,
            &Backoff::default(),
            "node-1",
            None,
            Target::Object,
            |node: &mut corev1::Node| {
                node.metadata.labels = None;
            },
        )
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(store.pending_conflicts(), 90, "ten attempts expected");
    }

    // Test: an unchanged object is never written
    #[tokio::test]
    async fn test_skips_unchanged() {
        let store = FakeStore::default();
        store.insert(labelled_node("node-1"));

        let updated: Option<corev1::Node> = update_with_retry(
            &store,
            &Backoff::default(),
            "node-1",
            None,
            Target::Object,
            |_: &mut corev1::Node| {},
        )
        .await
        .unwrap();

        assert!(updated.is_none());
        assert_eq!(store.writes(), 0);
    }

    // Test: backoff doubles up to the cap
    #[test]
    fn test_backoff_progression() {
        let backoff = Backoff::default();
        let mut delay = backoff.duration;
        let mut delays = vec![];
        for _ in 0..8 {
            delays.push(delay.as_millis());
            delay = backoff.next(delay);
        }
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320, 640, 1000]);
    }
}
