//! Whole-subtree walks and the periodic loop audit
//!
//! Both walks are bounded: subtree listings by a total node cap, loop audits by a
//! per-root hop limit. A capped subtree is flagged `truncated`, never returned as if
//! it were complete.

use crate::cycle::{direct_delegators, next_hop};
use crate::error::Result;
use crate::metrics;
use crate::types::{DelegatorSubtree, SubtreePower};
use govscope_registry::{Address, TokenRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DelegationTreeWalker {
    token: Arc<dyn TokenRegistry>,
    max_subtree_nodes: usize,
    loop_scan_max_hops: usize,
}

impl DelegationTreeWalker {
    pub fn new(
        token: Arc<dyn TokenRegistry>,
        max_subtree_nodes: usize,
        loop_scan_max_hops: usize,
    ) -> Self {
        Self {
            token,
            max_subtree_nodes,
            loop_scan_max_hops,
        }
    }

    /// Everyone delegating to `root`, directly or transitively, grouped by distance
    pub fn full_delegator_subtree(&self, root: &Address, max_depth: u32) -> DelegatorSubtree {
        let mut visited = HashSet::from([*root]);
        let mut frontier = vec![*root];
        let mut levels = Vec::new();
        let mut total_nodes = 0usize;
        let mut truncated = false;

        for _ in 0..max_depth {
            let mut next_level = Vec::new();

            'level: for node in &frontier {
                for delegator in direct_delegators(self.token.as_ref(), node) {
                    if !visited.insert(delegator) {
                        continue;
                    }
                    if total_nodes >= self.max_subtree_nodes {
                        truncated = true;
                        break 'level;
                    }
                    next_level.push(delegator);
                    total_nodes += 1;
                }
            }

            if next_level.is_empty() {
                break;
            }
            levels.push(next_level.clone());
            if truncated {
                break;
            }
            frontier = next_level;
        }

        if truncated {
            warn!(
                root = %root,
                cap = self.max_subtree_nodes,
                levels = levels.len(),
                "✂️ Delegator subtree truncated at node cap"
            );
        } else {
            debug!(root = %root, total_nodes, levels = levels.len(), "Delegator subtree walked");
        }

        DelegatorSubtree {
            root: *root,
            levels,
            total_nodes,
            truncated,
        }
    }

    /// Root balance plus every readable balance in its delegator subtree
    pub fn subtree_power(&self, root: &Address, max_depth: u32) -> Result<SubtreePower> {
        let own = self.token.balance_of(root)?;
        let subtree = self.full_delegator_subtree(root, max_depth);

        let mut total_power = own;
        let mut contributing_accounts = 1;
        for member in subtree.members() {
            match self.token.balance_of(member) {
                Ok(balance) => {
                    total_power = total_power.saturating_add(balance);
                    contributing_accounts += 1;
                }
                Err(e) => debug!(account = %member, error = %e, "Skipping unreadable balance"),
            }
        }

        Ok(SubtreePower {
            root: *root,
            total_power,
            contributing_accounts,
            truncated: subtree.truncated,
        })
    }

    /// Walk the forward chain of every root looking for a loop.
    ///
    /// Returns the first loop found as a closed path (`[a, b, a]`), or `None`.
    /// Chains already walked to a clean end are not walked again.
    pub fn detect_global_loops<I>(&self, roots: I) -> Option<Vec<Address>>
    where
        I: IntoIterator<Item = Address>,
    {
        let mut cleared: HashSet<Address> = HashSet::new();
        let mut scanned = 0usize;

        for root in roots {
            if cleared.contains(&root) {
                continue;
            }
            scanned += 1;

            let mut path = vec![root];
            let mut position = HashMap::from([(root, 0usize)]);
            let mut current = root;
            let mut ended_cleanly = false;

            for _ in 0..self.loop_scan_max_hops {
                let Some(next) = next_hop(self.token.as_ref(), &current) else {
                    ended_cleanly = true;
                    break;
                };
                if let Some(&first) = position.get(&next) {
                    let mut cycle = path[first..].to_vec();
                    cycle.push(next);

                    metrics::GLOBAL_LOOPS_DETECTED.inc();
                    warn!(
                        root = %root,
                        loop_len = cycle.len() - 1,
                        entry = %next,
                        "🔁 Delegation loop detected"
                    );
                    return Some(cycle);
                }
                if cleared.contains(&next) {
                    ended_cleanly = true;
                    break;
                }
                position.insert(next, path.len());
                path.push(next);
                current = next;
            }

            if ended_cleanly {
                cleared.extend(path);
            }
        }

        debug!(roots_scanned = scanned, "Global loop audit found nothing");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govscope_registry::{MemoryTokenRegistry, TokenAmount};

    fn addr(b: u8) -> Address {
        Address::repeat(b)
    }

    fn registry(edges: &[(u8, u8)]) -> Arc<MemoryTokenRegistry> {
        let registry = Arc::new(MemoryTokenRegistry::new());
        for (from, to) in edges {
            registry.set_balance(addr(*from), TokenAmount::new(10));
            registry.set_delegate(addr(*from), addr(*to));
        }
        registry
    }

    #[test]
    fn test_subtree_levels() {
        // 2,3 -> 1; 4 -> 2; 5 -> 4
        let walker = DelegationTreeWalker::new(registry(&[(2, 1), (3, 1), (4, 2), (5, 4)]), 100, 64);
        let subtree = walker.full_delegator_subtree(&addr(1), 8);

        assert_eq!(subtree.depth(), 3);
        assert_eq!(subtree.levels[0], vec![addr(2), addr(3)]);
        assert_eq!(subtree.levels[1], vec![addr(4)]);
        assert_eq!(subtree.levels[2], vec![addr(5)]);
        assert_eq!(subtree.total_nodes, 4);
        assert!(!subtree.truncated);
    }

    #[test]
    fn test_subtree_respects_depth_argument() {
        let walker = DelegationTreeWalker::new(registry(&[(2, 1), (3, 2), (4, 3)]), 100, 64);
        let subtree = walker.full_delegator_subtree(&addr(1), 2);
        assert_eq!(subtree.depth(), 2);
        assert_eq!(subtree.total_nodes, 2);
        assert!(!subtree.truncated);
    }

    #[test]
    fn test_subtree_truncation_flagged() {
        let edges: Vec<(u8, u8)> = (2..30).map(|i| (i, 1)).collect();
        let walker = DelegationTreeWalker::new(registry(&edges), 5, 64);
        let subtree = walker.full_delegator_subtree(&addr(1), 8);
        assert!(subtree.truncated);
        assert_eq!(subtree.total_nodes, 5);
        assert_eq!(subtree.members().count(), 5);
    }

    #[test]
    fn test_subtree_survives_cycles() {
        let walker = DelegationTreeWalker::new(registry(&[(1, 2), (2, 3), (3, 1)]), 100, 64);
        let subtree = walker.full_delegator_subtree(&addr(1), 8);
        assert_eq!(subtree.total_nodes, 2);
    }

    #[test]
    fn test_subtree_power_is_recursive() {
        let registry = registry(&[(2, 1), (3, 2)]);
        registry.set_balance(addr(1), TokenAmount::new(5));
        let walker = DelegationTreeWalker::new(registry, 100, 64);

        let power = walker.subtree_power(&addr(1), 8).unwrap();
        assert_eq!(power.total_power, TokenAmount::new(25));
        assert_eq!(power.contributing_accounts, 3);
        assert!(!power.truncated);
    }

    #[test]
    fn test_global_loop_found() {
        let walker = DelegationTreeWalker::new(
            registry(&[(1, 2), (2, 3), (3, 4), (4, 2), (9, 8)]),
            100,
            64,
        );
        let cycle = walker
            .detect_global_loops([addr(9), addr(1)])
            .expect("loop expected");
        assert_eq!(cycle, vec![addr(2), addr(3), addr(4), addr(2)]);
    }

    #[test]
    fn test_global_loop_absent() {
        let walker = DelegationTreeWalker::new(registry(&[(1, 2), (2, 3), (4, 3)]), 100, 64);
        assert_eq!(walker.detect_global_loops([addr(1), addr(2), addr(4)]), None);
    }

    #[test]
    fn test_global_loop_hop_limit() {
        let walker = DelegationTreeWalker::new(registry(&[(1, 2), (2, 3), (3, 4), (4, 1)]), 100, 2);
        assert_eq!(walker.detect_global_loops([addr(1)]), None);
    }
}
