//! Cycle and depth validation for proposed delegation edges
//!
//! A delegation edge `delegator -> delegatee` is accepted only if:
//! 1. It does not close a loop, and does not reconnect two delegation paths that
//!    already converge on a common descendant (diamond pattern). Both would let the
//!    same balance be counted twice.
//! 2. The longest chain running through the new edge stays within `max_depth`:
//!    `backward_depth(delegator) + 1 + forward_depth(delegatee) <= max_depth`.
//!
//! The graph is read lazily through the token registry and can change under us.
//! A failed read during a walk means "the chain ends here", never an error.
//! When the neighbourhood of the delegatee is too large to analyse online the
//! validator returns [`AnalyticsError::TooComplex`] rather than guessing.

use crate::config::EngineConfig;
use crate::error::{AnalyticsError, Result};
use crate::metrics;
use crate::types::{DelegationCheck, DelegationVerdict, DelegationWarning};
use govscope_registry::{Address, TokenRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Warning level that blocks an edge
pub const BLOCKING_WARNING_LEVEL: u8 = 3;

/// Bounds applied to every delegation walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationLimits {
    pub max_depth: u32,
    pub complexity_threshold: u64,
    pub max_subtree_nodes: usize,
}

impl DelegationLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            complexity_threshold: config.complexity_threshold,
            max_subtree_nodes: config.max_subtree_nodes,
        }
    }

    /// Like [`from_config`](Self::from_config), but a positive registry-side depth
    /// limit takes precedence over the configured one
    pub fn resolve(config: &EngineConfig, token: &dyn TokenRegistry) -> Self {
        let mut limits = Self::from_config(config);
        match token.max_delegation_depth() {
            Ok(depth) if depth > 0 => limits.max_depth = depth,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Registry depth limit unavailable, using configured value"),
        }
        limits
    }
}

/// Map a resulting chain depth onto a warning level (0-3)
pub fn level_for_depth(resulting_depth: u32, max_depth: u32) -> u8 {
    if resulting_depth > max_depth {
        3
    } else if resulting_depth == max_depth {
        2
    } else if resulting_depth >= max_depth.saturating_sub(2) {
        1
    } else {
        0
    }
}

/// Next account in `node`'s forward chain, or `None` where the chain ends
pub(crate) fn next_hop(token: &dyn TokenRegistry, node: &Address) -> Option<Address> {
    match token.delegate_of(node) {
        Ok(Some(next)) if !next.is_null() && next != *node => Some(next),
        Ok(_) => None,
        Err(e) => {
            debug!(account = %node, error = %e, "Delegate lookup failed, chain ends here");
            None
        }
    }
}

/// Direct delegators of `node`, excluding itself and the null sentinel
pub(crate) fn direct_delegators(token: &dyn TokenRegistry, node: &Address) -> Vec<Address> {
    match token.delegators_of(node) {
        Ok(list) => list
            .into_iter()
            .filter(|d| !d.is_null() && d != node)
            .collect(),
        Err(e) => {
            debug!(account = %node, error = %e, "Delegator lookup failed, subtree ends here");
            Vec::new()
        }
    }
}

/// Validates proposed delegation edges against the live delegation graph
pub struct DelegationValidator {
    token: Arc<dyn TokenRegistry>,
    limits: DelegationLimits,
}

impl DelegationValidator {
    pub fn new(token: Arc<dyn TokenRegistry>, limits: DelegationLimits) -> Self {
        Self { token, limits }
    }

    pub fn limits(&self) -> DelegationLimits {
        self.limits
    }

    fn next_hop(&self, node: &Address) -> Option<Address> {
        next_hop(self.token.as_ref(), node)
    }

    fn delegators(&self, node: &Address) -> Vec<Address> {
        direct_delegators(self.token.as_ref(), node)
    }

    /// Hops from `node` following delegate pointers, at most `max_depth`.
    ///
    /// Stops at a self-delegated account, the null sentinel, or an account already
    /// seen on this walk.
    pub fn forward_depth(&self, node: &Address) -> u32 {
        let mut visited = HashSet::from([*node]);
        let mut current = *node;
        let mut depth = 0;

        while depth < self.limits.max_depth {
            let Some(next) = self.next_hop(&current) else {
                break;
            };
            if !visited.insert(next) {
                debug!(start = %node, repeat = %next, depth, "Forward walk hit a cycle, stopping");
                break;
            }
            depth += 1;
            current = next;
        }

        depth
    }

    /// Longest inverse-delegation path ending at `node`, at most `max_depth`.
    ///
    /// Walks the full delegator subtree level by level. Fails with `TooComplex` if
    /// the walk would exceed the node cap, since a partial answer could under-report
    /// the depth.
    pub fn backward_depth(&self, node: &Address) -> Result<u32> {
        let mut visited = HashSet::from([*node]);
        let mut frontier = vec![*node];
        let mut depth = 0;

        while depth < self.limits.max_depth {
            let mut next_level = Vec::new();
            for member in &frontier {
                for delegator in self.delegators(member) {
                    if visited.insert(delegator) {
                        if visited.len() > self.limits.max_subtree_nodes {
                            return Err(self.too_complex(*node, visited.len() as u64));
                        }
                        next_level.push(delegator);
                    }
                }
            }
            if next_level.is_empty() {
                break;
            }
            depth += 1;
            frontier = next_level;
        }

        Ok(depth)
    }

    /// `backward_depth(delegator) + 1 + forward_depth(delegatee)`
    pub fn resulting_depth(&self, delegator: &Address, delegatee: &Address) -> Result<u32> {
        let backward = self.backward_depth(delegator)?;
        let forward = self.forward_depth(delegatee);
        Ok(backward + 1 + forward)
    }

    /// Would `delegator -> delegatee` close a loop or reconnect converging paths?
    ///
    /// Returns `TooComplex` when the delegatee's neighbourhood exceeds the complexity
    /// threshold; that result means "unknown", not "no cycle".
    pub fn detect_cycle(&self, delegator: &Address, delegatee: &Address) -> Result<bool> {
        if delegatee.is_null() || delegatee == delegator {
            return Ok(false);
        }

        // Two-node loop: the delegatee already points back at the delegator
        if self.next_hop(delegatee) == Some(*delegator) {
            debug!(delegator = %delegator, delegatee = %delegatee, "Direct back-edge found");
            return Ok(true);
        }

        // Re-affirming the existing edge adds nothing; only a loop already running
        // through it counts
        if self.next_hop(delegator) == Some(*delegatee) {
            return Ok(self.forward_reaches(delegatee, delegator));
        }

        let direct = self.delegators(delegatee).len() as u64;
        let depth = self.forward_depth(delegatee) as u64;
        let estimated = direct.saturating_mul(depth + 1);
        if estimated > self.limits.complexity_threshold {
            return Err(self.too_complex(*delegatee, estimated));
        }

        // Search outward from the delegatee over forward and backward edges. Reaching
        // the delegator means the new edge would either close a loop or join two paths
        // that already converge.
        let mut visited = HashSet::from([*delegatee]);
        let mut frontier = vec![*delegatee];
        let max_levels = self.limits.max_depth.saturating_mul(2);

        for _ in 0..max_levels {
            let mut next_level = Vec::new();
            for node in &frontier {
                let neighbours = self
                    .next_hop(node)
                    .into_iter()
                    .chain(self.delegators(node));

                for neighbour in neighbours {
                    if neighbour == *delegator {
                        debug!(
                            delegator = %delegator,
                            delegatee = %delegatee,
                            via = %node,
                            "Delegator reachable from delegatee"
                        );
                        return Ok(true);
                    }
                    if visited.insert(neighbour) {
                        if visited.len() > self.limits.max_subtree_nodes {
                            return Err(self.too_complex(*delegatee, visited.len() as u64));
                        }
                        next_level.push(neighbour);
                    }
                }
            }
            if next_level.is_empty() {
                break;
            }
            frontier = next_level;
        }

        Ok(false)
    }

    /// Does the forward chain from `start` pass through `target`?
    fn forward_reaches(&self, start: &Address, target: &Address) -> bool {
        let mut visited = HashSet::from([*start]);
        let mut current = *start;
        for _ in 0..self.limits.max_depth.saturating_mul(2) {
            let Some(next) = self.next_hop(&current) else {
                return false;
            };
            if next == *target {
                return true;
            }
            if !visited.insert(next) {
                return false;
            }
            current = next;
        }
        false
    }

    /// Check a proposed edge for cycles and depth
    pub fn validate(&self, delegator: &Address, delegatee: &Address) -> Result<DelegationCheck> {
        let max_depth = self.limits.max_depth;

        if delegatee.is_null() || delegatee == delegator {
            metrics::DELEGATION_VALIDATIONS
                .with_label_values(&["valid"])
                .inc();
            return Ok(DelegationCheck::accepted(0, max_depth));
        }

        let outcome = self.evaluate(delegator, delegatee);
        let label = match &outcome {
            Ok(check) if check.valid => "valid",
            Ok(check) if check.reason == DelegationVerdict::Cycle => "cycle",
            Ok(_) => "depth_exceeded",
            Err(AnalyticsError::TooComplex { .. }) => "too_complex",
            Err(_) => "error",
        };
        metrics::DELEGATION_VALIDATIONS
            .with_label_values(&[label])
            .inc();

        outcome
    }

    fn evaluate(&self, delegator: &Address, delegatee: &Address) -> Result<DelegationCheck> {
        let max_depth = self.limits.max_depth;

        if self.detect_cycle(delegator, delegatee)? {
            return Ok(DelegationCheck::rejected(
                DelegationVerdict::Cycle,
                0,
                max_depth,
            ));
        }

        let depth = self.resulting_depth(delegator, delegatee)?;
        if depth > max_depth {
            Ok(DelegationCheck::rejected(
                DelegationVerdict::DepthExceeded,
                depth,
                max_depth,
            ))
        } else {
            Ok(DelegationCheck::accepted(depth, max_depth))
        }
    }

    /// 3 for a cycle or an over-deep chain, 2 at exactly `max_depth`,
    /// 1 within two hops of it, else 0
    pub fn warning_level(&self, delegator: &Address, delegatee: &Address) -> Result<u8> {
        let check = self.validate(delegator, delegatee)?;
        Ok(self.level_of(delegator, delegatee, &check))
    }

    fn level_of(&self, delegator: &Address, delegatee: &Address, check: &DelegationCheck) -> u8 {
        if delegatee.is_null() || delegatee == delegator {
            0
        } else if !check.valid {
            BLOCKING_WARNING_LEVEL
        } else {
            level_for_depth(check.resulting_depth, check.max_depth)
        }
    }

    /// Validate, emit observability events for any warning, block only on level 3
    pub fn check_and_notify(
        &self,
        delegator: &Address,
        delegatee: &Address,
    ) -> Result<DelegationWarning> {
        let check = self.validate(delegator, delegatee)?;
        let level = self.level_of(delegator, delegatee, &check);
        let blocked = level >= BLOCKING_WARNING_LEVEL;

        if level > 0 {
            metrics::DELEGATION_WARNINGS
                .with_label_values(&[&level.to_string()])
                .inc();
        }

        match level {
            0 => debug!(delegator = %delegator, delegatee = %delegatee, "Delegation clear"),
            1 | 2 => warn!(
                delegator = %delegator,
                delegatee = %delegatee,
                level,
                resulting_depth = check.resulting_depth,
                max_depth = check.max_depth,
                "⚠️ Delegation chain approaching depth limit"
            ),
            _ => warn!(
                delegator = %delegator,
                delegatee = %delegatee,
                level,
                reason = ?check.reason,
                resulting_depth = check.resulting_depth,
                "🛑 Delegation blocked"
            ),
        }

        Ok(DelegationWarning {
            level,
            check,
            blocked,
        })
    }

    fn too_complex(&self, node: Address, estimated: u64) -> AnalyticsError {
        metrics::TOO_COMPLEX_REFUSALS.inc();
        info!(
            node = %node,
            estimated,
            threshold = self.limits.complexity_threshold,
            "Delegation neighbourhood too large for online analysis"
        );
        AnalyticsError::TooComplex {
            node,
            estimated,
            threshold: self.limits.complexity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govscope_registry::MemoryTokenRegistry;

    fn addr(b: u8) -> Address {
        Address::repeat(b)
    }

    fn setup(edges: &[(u8, u8)]) -> (Arc<MemoryTokenRegistry>, DelegationValidator) {
        let registry = Arc::new(MemoryTokenRegistry::new());
        for (from, to) in edges {
            registry.set_delegate(addr(*from), addr(*to));
        }
        let validator = DelegationValidator::new(
            registry.clone(),
            DelegationLimits::from_config(&EngineConfig::default()),
        );
        (registry, validator)
    }

    #[test]
    fn test_forward_depth_follows_chain() {
        let (_, validator) = setup(&[(1, 2), (2, 3), (3, 4)]);
        assert_eq!(validator.forward_depth(&addr(1)), 3);
        assert_eq!(validator.forward_depth(&addr(3)), 1);
        assert_eq!(validator.forward_depth(&addr(4)), 0);
    }

    #[test]
    fn test_forward_depth_short_circuits_cycles() {
        let (_, validator) = setup(&[(1, 2), (2, 3), (3, 1)]);
        assert_eq!(validator.forward_depth(&addr(1)), 2);
    }

    #[test]
    fn test_forward_depth_capped_at_max_depth() {
        let edges: Vec<(u8, u8)> = (1..30).map(|i| (i, i + 1)).collect();
        let (_, validator) = setup(&edges);
        assert_eq!(validator.forward_depth(&addr(1)), 8);
    }

    #[test]
    fn test_forward_depth_tolerates_disappearing_node() {
        let (registry, validator) = setup(&[(1, 2), (2, 3), (3, 4)]);
        registry.remove_account(addr(3));
        assert_eq!(validator.forward_depth(&addr(1)), 1);
    }

    #[test]
    fn test_backward_depth_walks_full_subtree() {
        // 5 <- 4 <- 3 <- 2 <- 1, plus a shallow branch 6 -> 5
        let (_, validator) = setup(&[(1, 2), (2, 3), (3, 4), (4, 5), (6, 5)]);
        assert_eq!(validator.backward_depth(&addr(5)).unwrap(), 4);
        assert_eq!(validator.backward_depth(&addr(3)).unwrap(), 2);
        assert_eq!(validator.backward_depth(&addr(1)).unwrap(), 0);
    }

    #[test]
    fn test_backward_depth_beyond_three_levels() {
        let edges: Vec<(u8, u8)> = (1..7).map(|i| (i, i + 1)).collect();
        let (_, validator) = setup(&edges);
        assert_eq!(validator.backward_depth(&addr(7)).unwrap(), 6);
    }

    #[test]
    fn test_backward_depth_node_cap_reports_too_complex() {
        let registry = Arc::new(MemoryTokenRegistry::new());
        for i in 1..=20u8 {
            registry.set_delegate(addr(i), addr(100));
        }
        let limits = DelegationLimits {
            max_depth: 8,
            complexity_threshold: 10_000,
            max_subtree_nodes: 10,
        };
        let validator = DelegationValidator::new(registry, limits);
        assert!(matches!(
            validator.backward_depth(&addr(100)),
            Err(AnalyticsError::TooComplex { .. })
        ));
    }

    #[test]
    fn test_resulting_depth_combines_both_sides() {
        // backward(D=10) = 3, forward(E=20) = 2
        let (_, validator) = setup(&[(13, 12), (12, 11), (11, 10), (20, 21), (21, 22)]);
        assert_eq!(validator.backward_depth(&addr(10)).unwrap(), 3);
        assert_eq!(validator.forward_depth(&addr(20)), 2);
        assert_eq!(validator.resulting_depth(&addr(10), &addr(20)).unwrap(), 6);

        let check = validator.validate(&addr(10), &addr(20)).unwrap();
        assert!(check.valid);
        assert_eq!(check.resulting_depth, 6);
    }

    #[test]
    fn test_depth_exceeded_when_limit_lower() {
        let (registry, _) = setup(&[(13, 12), (12, 11), (11, 10), (20, 21), (21, 22)]);
        let limits = DelegationLimits {
            max_depth: 5,
            complexity_threshold: 10_000,
            max_subtree_nodes: 10_000,
        };
        let validator = DelegationValidator::new(registry, limits);
        let check = validator.validate(&addr(10), &addr(20)).unwrap();
        assert!(!check.valid);
        assert_eq!(check.reason, DelegationVerdict::DepthExceeded);
        assert_eq!(check.resulting_depth, 6);
        assert_eq!(validator.warning_level(&addr(10), &addr(20)).unwrap(), 3);
    }

    #[test]
    fn test_two_node_cycle_detected_both_ways() {
        let (_, validator) = setup(&[(1, 2), (2, 1)]);
        assert!(validator.detect_cycle(&addr(1), &addr(2)).unwrap());
        assert!(validator.detect_cycle(&addr(2), &addr(1)).unwrap());
        assert_eq!(validator.warning_level(&addr(1), &addr(2)).unwrap(), 3);
        assert_eq!(validator.warning_level(&addr(2), &addr(1)).unwrap(), 3);
    }

    #[test]
    fn test_diamond_back_edge_rejected() {
        // A -> C, B -> C; proposed C -> A
        let (_, validator) = setup(&[(0xA, 0xC), (0xB, 0xC)]);
        assert!(validator.detect_cycle(&addr(0xC), &addr(0xA)).unwrap());

        let check = validator.validate(&addr(0xC), &addr(0xA)).unwrap();
        assert!(!check.valid);
        assert_eq!(check.reason, DelegationVerdict::Cycle);
    }

    #[test]
    fn test_converging_paths_detected_by_search() {
        // A -> C, B -> C, D -> B; proposed A -> D reconnects on C
        let (_, validator) = setup(&[(0xA, 0xC), (0xB, 0xC), (0xD, 0xB)]);
        assert!(validator.detect_cycle(&addr(0xA), &addr(0xD)).unwrap());
    }

    #[test]
    fn test_reaffirming_existing_edge() {
        let (_, validator) = setup(&[(1, 2), (2, 3)]);
        assert!(!validator.detect_cycle(&addr(1), &addr(2)).unwrap());
        assert!(validator.validate(&addr(1), &addr(2)).unwrap().valid);

        let (_, validator) = setup(&[(1, 2), (2, 3), (3, 1)]);
        assert!(validator.detect_cycle(&addr(1), &addr(2)).unwrap());
    }

    #[test]
    fn test_disjoint_components_are_fine() {
        let (_, validator) = setup(&[(1, 2), (3, 4)]);
        assert!(!validator.detect_cycle(&addr(1), &addr(3)).unwrap());
        let check = validator.validate(&addr(1), &addr(3)).unwrap();
        assert!(check.valid);
        // backward(1) = 0, forward(3) = 1
        assert_eq!(check.resulting_depth, 2);
    }

    #[test]
    fn test_long_cycle_detected() {
        let (_, validator) = setup(&[(2, 3), (3, 4), (4, 5), (5, 1)]);
        assert!(validator.detect_cycle(&addr(1), &addr(2)).unwrap());
    }

    #[test]
    fn test_self_and_null_always_valid() {
        let (_, validator) = setup(&[(1, 2), (2, 1)]);
        assert!(validator.validate(&addr(1), &addr(1)).unwrap().valid);
        assert!(validator.validate(&addr(1), &Address::NULL).unwrap().valid);
        assert_eq!(validator.warning_level(&addr(1), &Address::NULL).unwrap(), 0);
    }

    #[test]
    fn test_complexity_threshold_refuses() {
        let registry = Arc::new(MemoryTokenRegistry::new());
        for i in 1..=50u8 {
            registry.set_delegate(addr(i), addr(200));
        }
        registry.set_delegate(addr(200), addr(201));
        let limits = DelegationLimits {
            max_depth: 8,
            complexity_threshold: 60,
            max_subtree_nodes: 10_000,
        };
        let validator = DelegationValidator::new(registry, limits);
        // 50 delegators * (1 + 1) = 100 > 60
        let err = validator.detect_cycle(&addr(150), &addr(200)).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::TooComplex { estimated: 100, threshold: 60, .. }
        ));
    }

    #[test]
    fn test_warning_levels_by_depth() {
        assert_eq!(level_for_depth(9, 8), 3);
        assert_eq!(level_for_depth(8, 8), 2);
        assert_eq!(level_for_depth(7, 8), 1);
        assert_eq!(level_for_depth(6, 8), 1);
        assert_eq!(level_for_depth(5, 8), 0);
    }

    #[test]
    fn test_check_and_notify_blocks_only_level_three() {
        // 1 -> 2 -> ... -> 8: delegating 0x50 -> 1 yields depth 8 (level 2)
        let edges: Vec<(u8, u8)> = (1..8).map(|i| (i, i + 1)).collect();
        let (_, validator) = setup(&edges);

        let warning = validator.check_and_notify(&addr(0x50), &addr(1)).unwrap();
        assert_eq!(warning.level, 2);
        assert!(!warning.blocked);
        assert!(warning.check.valid);

        let warning = validator.check_and_notify(&addr(0x50), &addr(0x50)).unwrap();
        assert_eq!(warning.level, 0);

        let edges: Vec<(u8, u8)> = (1..9).map(|i| (i, i + 1)).collect();
        let (_, validator) = setup(&edges);
        let warning = validator.check_and_notify(&addr(0x50), &addr(1)).unwrap();
        assert_eq!(warning.level, 3);
        assert!(warning.blocked);
        assert_eq!(warning.check.reason, DelegationVerdict::DepthExceeded);
    }

    #[test]
    fn test_registry_depth_limit_takes_precedence() {
        let registry = MemoryTokenRegistry::new().with_max_depth(4);
        let limits = DelegationLimits::resolve(&EngineConfig::default(), &registry);
        assert_eq!(limits.max_depth, 4);

        let registry = MemoryTokenRegistry::new();
        let limits = DelegationLimits::resolve(&EngineConfig::default(), &registry);
        assert_eq!(limits.max_depth, 8);
    }
}
