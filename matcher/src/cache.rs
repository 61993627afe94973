//! Session-scoped caches used inside the matcher.
//!
//! Distinct from (and upstream of) the durable mapping cache: everything
//! here lives only as long as one matching session.

use std::collections::HashMap;
use std::sync::Arc;

use pulse_github::OrgMember;
use tokio::sync::Mutex;
use tokio::sync::OnceCell;

/// Per-organization member lists, populated once per session. The first
/// caller fetches; concurrent callers await the same cell instead of
/// enumerating the organization redundantly.
#[derive(Default)]
pub struct OrgMemberCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<Vec<OrgMember>>>>>>,
}

impl OrgMemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the member list for `org`, fetching it at most once. A failed
    /// fetch leaves the cell empty so a later strategy may try again.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        org: &str,
        fetch: F,
    ) -> Result<Arc<Vec<OrgMember>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Vec<OrgMember>>, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(org.to_string()).or_default())
        };
        cell.get_or_try_init(fetch).await.map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn fetches_each_org_once() {
        let cache = OrgMemberCache::new();
        let fetches = AtomicU32::new(0);

        for _ in 0..3 {
            let members = cache
                .get_or_fetch("acme-eng", || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(Arc::new(vec![OrgMember {
                        login: "janedoe".to_string(),
                    }]))
                })
                .await
                .unwrap();
            assert_eq!(members.len(), 1);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache = Arc::new(OrgMemberCache::new());
        let fetches = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("acme-eng", || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        // Hold the cell long enough for every task to queue up.
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok::<_, std::convert::Infallible>(Arc::new(Vec::new()))
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cell_empty_for_retry() {
        let cache = OrgMemberCache::new();
        let result = cache
            .get_or_fetch("acme-eng", || async { Err::<Arc<Vec<OrgMember>>, _>("down") })
            .await;
        assert!(result.is_err());

        let members = cache
            .get_or_fetch("acme-eng", || async {
                Ok::<_, &str>(Arc::new(vec![OrgMember {
                    login: "janedoe".to_string(),
                }]))
            })
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
    }
}
