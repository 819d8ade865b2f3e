//! Manager-account hierarchy traversal
//!
//! Starting from a root manager, each manager's direct children are listed
//! through `customer_client`. Managers go back on the work queue, leaf
//! accounts are yielded as soon as they are found so queries can start
//! while the walk is still running.

use async_stream::stream;
use futures::stream::Stream;
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use tracing::{debug, info, warn};

use crate::client::{AdsClient, SearchRow};
use crate::config::RunConfig;
use crate::error::{AdsError, Result};
use crate::models::{Account, AccountId};

/// Direct children of the customer the query is issued against
pub const CHILD_ACCOUNTS_QUERY: &str = "SELECT customer_client.id, customer_client.manager, \
     customer_client.level, customer_client.descriptive_name, customer_client.status \
     FROM customer_client WHERE customer_client.level = 1";

const ENABLED_STATUS: &str = "ENABLED";

/// What the traversal did with a newly seen account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting of a client account; hand it to the caller
    Leaf,
    /// First sighting of a manager; queued for expansion
    Manager,
    /// Already seen through another manager link
    Duplicate,
    /// Manager below the depth limit; not expanded
    BeyondMaxDepth,
}

/// Breadth-first work queue plus visited-set
///
/// Each account id is admitted at most once no matter how many manager
/// links point at it, so cycles between managers terminate.
#[derive(Debug, Clone)]
pub struct TraversalQueue {
    queue: VecDeque<Account>,
    visited: HashSet<AccountId>,
    max_depth: Option<u32>,
}

impl TraversalQueue {
    pub fn new(root: AccountId) -> Self {
        Self {
            queue: VecDeque::from([Account::manager(root, 0)]),
            visited: HashSet::from([root]),
            max_depth: None,
        }
    }

    /// Managers deeper than `max_depth` are admitted but never expanded
    pub fn with_max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn next_manager(&mut self) -> Option<Account> {
        self.queue.pop_front()
    }

    pub fn admit(&mut self, account: Account) -> Admission {
        if !self.visited.insert(account.id) {
            return Admission::Duplicate;
        }

        if !account.is_manager {
            return Admission::Leaf;
        }

        if self.max_depth.is_some_and(|max| account.depth > max) {
            return Admission::BeyondMaxDepth;
        }

        self.queue.push_back(account);
        Admission::Manager
    }

    /// Managers waiting to be expanded
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Accounts seen so far, root included
    pub fn visited(&self) -> usize {
        self.visited.len()
    }
}

/// Items produced by a walk
#[derive(Debug)]
pub enum WalkItem {
    /// A client account with click data of its own
    Leaf(Account),
    /// Listing a manager's children failed; its subtree is missing from the walk
    BranchSkipped {
        manager_id: AccountId,
        error: AdsError,
    },
}

/// Discovers every leaf account reachable from a root manager
pub struct HierarchyWalker<A> {
    client: A,
    skip_inactive: bool,
    max_depth: Option<u32>,
}

impl<A: AdsClient> HierarchyWalker<A> {
    pub fn new(client: A) -> Self {
        Self {
            client,
            skip_inactive: true,
            max_depth: None,
        }
    }

    pub fn from_config(client: A, config: &RunConfig) -> Self {
        Self {
            client,
            skip_inactive: config.skip_inactive_accounts,
            max_depth: config.max_depth,
        }
    }

    /// List the direct children of one manager
    pub async fn child_accounts(&self, manager: &Account) -> Result<Vec<Account>> {
        let rows = self
            .client
            .search(manager.id, CHILD_ACCOUNTS_QUERY)
            .await
            .map_err(|e| e.for_branch(manager.id))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| self.row_to_child(manager, row))
            .collect())
    }

    fn row_to_child(&self, manager: &Account, row: SearchRow) -> Option<Account> {
        let client = row.customer_client?;
        let id = AccountId::new(client.id?);

        // customer_client includes the queried customer itself at level 0
        if id == manager.id {
            return None;
        }

        if self.skip_inactive {
            if let Some(status) = client.status.as_deref() {
                if status != ENABLED_STATUS {
                    debug!("Skipping account {} with status {}", id, status);
                    return None;
                }
            }
        }

        let depth = manager.depth + 1;
        let account = if client.manager.unwrap_or(false) {
            Account::manager(id, depth)
        } else {
            Account::leaf(id, depth)
        };

        Some(match client.descriptive_name {
            Some(name) => account.with_name(name),
            None => account,
        })
    }

    /// Walk the hierarchy under `root`, yielding leaves as they are found
    ///
    /// The stream is finite and single-use. A failed child listing is
    /// reported as [`WalkItem::BranchSkipped`] and the walk continues with
    /// the remaining queue.
    pub fn discover_leaf_accounts(
        &self,
        root: AccountId,
    ) -> Pin<Box<dyn Stream<Item = WalkItem> + Send + '_>> {
        Box::pin(stream! {
            let mut traversal = TraversalQueue::new(root).with_max_depth(self.max_depth);
            let mut leaves = 0usize;

            while let Some(manager) = traversal.next_manager() {
                match self.child_accounts(&manager).await {
                    Ok(children) => {
                        debug!(
                            "Manager {} has {} direct children",
                            manager.label(),
                            children.len()
                        );

                        for child in children {
                            match traversal.admit(child.clone()) {
                                Admission::Leaf => {
                                    leaves += 1;
                                    yield WalkItem::Leaf(child);
                                }
                                Admission::Manager => {}
                                Admission::Duplicate => {
                                    debug!("Account {} already visited, skipping", child.id);
                                }
                                Admission::BeyondMaxDepth => {
                                    warn!(
                                        "Manager {} is at depth {}, beyond the configured limit; not expanding",
                                        child.label(),
                                        child.depth
                                    );
                                }
                            }
                        }

                        debug!(
                            "Expanded {}: {} managers queued, {} accounts visited",
                            manager.id,
                            traversal.pending(),
                            traversal.visited()
                        );
                    }
                    Err(error) => {
                        warn!("Skipping branch under manager {}: {}", manager.id, error);
                        yield WalkItem::BranchSkipped {
                            manager_id: manager.id,
                            error,
                        };
                    }
                }
            }

            info!(
                "Hierarchy walk under {} finished: {} accounts visited, {} leaves",
                root,
                traversal.visited(),
                leaves
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CustomerClient;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory hierarchy: manager id -> children (id, is_manager, status)
    #[derive(Default)]
    struct FakeHierarchy {
        children: HashMap<u64, Vec<(u64, bool, &'static str)>>,
        failing: HashSet<u64>,
        calls: AtomicUsize,
    }

    impl FakeHierarchy {
        fn with(mut self, manager: u64, children: &[(u64, bool)]) -> Self {
            self.children.insert(
                manager,
                children.iter().map(|&(id, m)| (id, m, "ENABLED")).collect(),
            );
            self
        }

        fn with_status(mut self, manager: u64, id: u64, status: &'static str) -> Self {
            self.children.entry(manager).or_default().push((id, false, status));
            self
        }

        fn failing(mut self, manager: u64) -> Self {
            self.failing.insert(manager);
            self
        }
    }

    #[async_trait]
    impl AdsClient for FakeHierarchy {
        async fn search(&self, customer_id: AccountId, query: &str) -> Result<Vec<SearchRow>> {
            assert_eq!(query, CHILD_ACCOUNTS_QUERY);
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.failing.contains(&customer_id.get()) {
                return Err(AdsError::Forbidden("USER_PERMISSION_DENIED".to_string()));
            }

            // The API reports the queried customer itself at level 0
            let mut rows = vec![SearchRow {
                customer_client: Some(CustomerClient {
                    id: Some(customer_id.get()),
                    manager: Some(true),
                    level: Some(0),
                    ..Default::default()
                }),
                ..Default::default()
            }];

            for &(id, manager, status) in self.children.get(&customer_id.get()).into_iter().flatten() {
                rows.push(SearchRow {
                    customer_client: Some(CustomerClient {
                        id: Some(id),
                        manager: Some(manager),
                        level: Some(1),
                        descriptive_name: Some(format!("account {}", id)),
                        status: Some(status.to_string()),
                        client_customer: Some(format!("customers/{}", id)),
                    }),
                    ..Default::default()
                });
            }
            Ok(rows)
        }
    }

    async fn collect_walk(walker: &HierarchyWalker<FakeHierarchy>, root: u64) -> (Vec<u64>, Vec<u64>) {
        let items: Vec<WalkItem> = walker.discover_leaf_accounts(AccountId::new(root)).collect().await;
        let mut leaves = Vec::new();
        let mut skipped = Vec::new();
        for item in items {
            match item {
                WalkItem::Leaf(account) => leaves.push(account.id.get()),
                WalkItem::BranchSkipped { manager_id, .. } => skipped.push(manager_id.get()),
            }
        }
        (leaves, skipped)
    }

    #[test]
    fn test_traversal_queue_admits_each_account_once() {
        let mut traversal = TraversalQueue::new(AccountId::new(1));

        assert_eq!(traversal.admit(Account::leaf(AccountId::new(2), 1)), Admission::Leaf);
        assert_eq!(traversal.admit(Account::leaf(AccountId::new(2), 1)), Admission::Duplicate);
        assert_eq!(traversal.admit(Account::manager(AccountId::new(3), 1)), Admission::Manager);
        assert_eq!(traversal.admit(Account::manager(AccountId::new(3), 2)), Admission::Duplicate);
        // The root itself is never re-admitted
        assert_eq!(traversal.admit(Account::manager(AccountId::new(1), 2)), Admission::Duplicate);

        assert_eq!(traversal.visited(), 3);
    }

    #[test]
    fn test_traversal_queue_is_breadth_first() {
        let mut traversal = TraversalQueue::new(AccountId::new(1));
        assert_eq!(traversal.next_manager().unwrap().id, AccountId::new(1));
        assert_eq!(traversal.pending(), 0);

        traversal.admit(Account::manager(AccountId::new(10), 1));
        traversal.admit(Account::manager(AccountId::new(20), 1));
        assert_eq!(traversal.pending(), 2);

        let first = traversal.next_manager().unwrap();
        traversal.admit(Account::manager(AccountId::new(11), first.depth + 1));

        let order: Vec<u64> = std::iter::from_fn(|| traversal.next_manager())
            .map(|a| a.id.get())
            .collect();
        assert_eq!(order, vec![20, 11]);
    }

    #[test]
    fn test_traversal_queue_depth_limit() {
        let mut traversal = TraversalQueue::new(AccountId::new(1)).with_max_depth(Some(1));
        traversal.next_manager();

        assert_eq!(traversal.admit(Account::manager(AccountId::new(2), 1)), Admission::Manager);
        assert_eq!(
            traversal.admit(Account::manager(AccountId::new(3), 2)),
            Admission::BeyondMaxDepth
        );
        // Leaves are yielded regardless of depth
        assert_eq!(traversal.admit(Account::leaf(AccountId::new(4), 5)), Admission::Leaf);
        assert_eq!(traversal.pending(), 1);
    }

    #[tokio::test]
    async fn test_walk_yields_all_leaves() {
        let fake = FakeHierarchy::default()
            .with(111, &[(222, true), (333, false)])
            .with(222, &[(444, false), (555, false)]);
        let walker = HierarchyWalker::new(fake);

        let (mut leaves, skipped) = collect_walk(&walker, 111).await;
        leaves.sort();

        assert_eq!(leaves, vec![333, 444, 555]);
        assert!(skipped.is_empty());
    }

    #[tokio::test]
    async fn test_shared_children_are_yielded_once() {
        let fake = FakeHierarchy::default()
            .with(1, &[(2, true), (3, true)])
            .with(2, &[(10, false), (4, true)])
            .with(3, &[(10, false), (4, true)])
            .with(4, &[(11, false)]);
        let walker = HierarchyWalker::new(fake);

        let (mut leaves, _) = collect_walk(&walker, 1).await;
        leaves.sort();

        assert_eq!(leaves, vec![10, 11]);
        // 1, 2, 3 and 4 each expanded exactly once
        assert_eq!(walker.client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_manager_cycle_terminates() {
        let fake = FakeHierarchy::default()
            .with(1, &[(2, true)])
            .with(2, &[(3, true), (20, false)])
            .with(3, &[(1, true), (2, true), (30, false)]);
        let walker = HierarchyWalker::new(fake);

        let (mut leaves, _) = collect_walk(&walker, 1).await;
        leaves.sort();

        assert_eq!(leaves, vec![20, 30]);
        assert_eq!(walker.client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_branch_is_skipped() {
        let fake = FakeHierarchy::default()
            .with(111, &[(222, true), (333, false), (666, true)])
            .with(222, &[(444, false)])
            .with(666, &[(777, false)])
            .failing(222);
        let walker = HierarchyWalker::new(fake);

        let (mut leaves, skipped) = collect_walk(&walker, 111).await;
        leaves.sort();

        assert_eq!(leaves, vec![333, 777]);
        assert_eq!(skipped, vec![222]);
    }

    #[tokio::test]
    async fn test_root_failure_yields_single_skip() {
        let fake = FakeHierarchy::default().failing(111);
        let walker = HierarchyWalker::new(fake);

        let (leaves, skipped) = collect_walk(&walker, 111).await;

        assert!(leaves.is_empty());
        assert_eq!(skipped, vec![111]);
    }

    #[tokio::test]
    async fn test_branch_error_names_manager() {
        let fake = FakeHierarchy::default().failing(222);
        let walker = HierarchyWalker::new(fake);

        let err = walker
            .child_accounts(&Account::manager(AccountId::new(222), 1))
            .await
            .unwrap_err();

        match err {
            AdsError::HierarchyBranch { manager_id, message } => {
                assert_eq!(manager_id, AccountId::new(222));
                assert!(message.contains("USER_PERMISSION_DENIED"));
            }
            other => panic!("expected HierarchyBranch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inactive_accounts_are_skipped_by_default() {
        let fake = FakeHierarchy::default()
            .with(1, &[(2, false)])
            .with_status(1, 3, "CANCELED")
            .with_status(1, 4, "SUSPENDED");
        let walker = HierarchyWalker::new(fake);

        let (leaves, _) = collect_walk(&walker, 1).await;
        assert_eq!(leaves, vec![2]);
    }

    #[tokio::test]
    async fn test_inactive_accounts_kept_when_configured() {
        let fake = FakeHierarchy::default()
            .with(1, &[(2, false)])
            .with_status(1, 3, "CANCELED");
        let config = RunConfig {
            skip_inactive_accounts: false,
            ..RunConfig::default()
        };
        let walker = HierarchyWalker::from_config(fake, &config);

        let (mut leaves, _) = collect_walk(&walker, 1).await;
        leaves.sort();
        assert_eq!(leaves, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_child_accounts_carry_depth_and_name() {
        let fake = FakeHierarchy::default().with(222, &[(444, false), (888, true)]);
        let walker = HierarchyWalker::new(fake);

        let children = walker
            .child_accounts(&Account::manager(AccountId::new(222), 1))
            .await
            .unwrap();

        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.depth == 2));
        assert_eq!(children[0].name.as_deref(), Some("account 444"));
        assert!(!children[0].is_manager);
        assert!(children[1].is_manager);
    }

    #[tokio::test]
    async fn test_max_depth_limits_expansion() {
        let fake = FakeHierarchy::default()
            .with(1, &[(2, true), (10, false)])
            .with(2, &[(3, true), (20, false)])
            .with(3, &[(30, false)]);
        let config = RunConfig {
            max_depth: Some(1),
            ..RunConfig::default()
        };
        let walker = HierarchyWalker::from_config(fake, &config);

        let (mut leaves, _) = collect_walk(&walker, 1).await;
        leaves.sort();
        assert_eq!(leaves, vec![10, 20]);
    }
}
