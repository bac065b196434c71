//! Single-hop voting power and per-account delegation statistics

use crate::cycle::direct_delegators;
use crate::error::Result;
use crate::types::AccountDelegationStats;
use govscope_registry::{Address, TokenAmount, TokenRegistry};
use std::sync::Arc;
use tracing::debug;

pub struct PowerCalculator {
    token: Arc<dyn TokenRegistry>,
}

impl PowerCalculator {
    pub fn new(token: Arc<dyn TokenRegistry>) -> Self {
        Self { token }
    }

    /// Own balance plus the balances of direct delegators.
    ///
    /// Not a recursive roll-up: power delegated to a delegator of `account` is
    /// not included. Use the subtree walker for that.
    pub fn effective_power(&self, account: &Address) -> Result<TokenAmount> {
        let own = self.token.balance_of(account)?;
        let delegated = self.delegated_balance(account);
        Ok(own.saturating_add(delegated))
    }

    /// Sum of direct delegators' balances; unreadable balances are skipped
    pub fn delegated_balance(&self, account: &Address) -> TokenAmount {
        self.delegators_of(account)
            .iter()
            .filter_map(|d| self.balance_or_skip(d))
            .sum()
    }

    pub fn account_stats(&self, account: &Address) -> Result<AccountDelegationStats> {
        let delegate = self
            .token
            .delegate_of(account)?
            .filter(|d| !d.is_null() && d != account);
        let delegators = self.delegators_of(account);
        let delegated_balance: TokenAmount = delegators
            .iter()
            .filter_map(|d| self.balance_or_skip(d))
            .sum();
        let total_supply = self.token.total_supply()?;

        Ok(AccountDelegationStats {
            account: *account,
            delegate,
            is_delegating: delegate.is_some(),
            delegator_count: delegators.len(),
            delegated_balance,
            delegated_share_bps: delegated_balance.share_bps(total_supply),
        })
    }

    fn delegators_of(&self, account: &Address) -> Vec<Address> {
        direct_delegators(self.token.as_ref(), account)
    }

    /// Balance of `account`, or `None` (logged) if it cannot be read
    pub(crate) fn balance_or_skip(&self, account: &Address) -> Option<TokenAmount> {
        match self.token.balance_of(account) {
            Ok(balance) => Some(balance),
            Err(e) => {
                debug!(account = %account, error = %e, "Skipping unreadable balance");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use govscope_registry::{MemoryTokenRegistry, RegistryError};

    fn addr(b: u8) -> Address {
        Address::repeat(b)
    }

    fn fixture() -> (Arc<MemoryTokenRegistry>, PowerCalculator) {
        let registry = Arc::new(MemoryTokenRegistry::new());
        registry.set_balance(addr(1), TokenAmount::new(100));
        registry.set_balance(addr(2), TokenAmount::new(40));
        registry.set_balance(addr(3), TokenAmount::new(60));
        registry.set_balance(addr(4), TokenAmount::new(800));
        // 2 -> 1, 3 -> 1, 4 -> 2
        registry.set_delegate(addr(2), addr(1));
        registry.set_delegate(addr(3), addr(1));
        registry.set_delegate(addr(4), addr(2));
        (registry.clone(), PowerCalculator::new(registry))
    }

    #[test]
    fn test_effective_power_is_single_hop() {
        let (_, calc) = fixture();
        // 100 + 40 + 60; account 4's 800 reaches 1 only through 2
        assert_eq!(calc.effective_power(&addr(1)).unwrap(), TokenAmount::new(200));
        assert_eq!(calc.effective_power(&addr(2)).unwrap(), TokenAmount::new(840));
        assert_eq!(calc.effective_power(&addr(4)).unwrap(), TokenAmount::new(800));
    }

    #[test]
    fn test_effective_power_skips_vanished_delegator() {
        let (registry, calc) = fixture();
        registry.remove_account(addr(3));
        assert_eq!(calc.effective_power(&addr(1)).unwrap(), TokenAmount::new(140));
    }

    #[test]
    fn test_effective_power_unknown_account_fails() {
        let (registry, calc) = fixture();
        registry.remove_account(addr(9));
        assert!(matches!(
            calc.effective_power(&addr(9)),
            Err(AnalyticsError::Registry(RegistryError::NotFound(_)))
        ));
    }

    #[test]
    fn test_account_stats() {
        let (_, calc) = fixture();
        let stats = calc.account_stats(&addr(1)).unwrap();
        assert_eq!(stats.delegate, None);
        assert!(!stats.is_delegating);
        assert_eq!(stats.delegator_count, 2);
        assert_eq!(stats.delegated_balance, TokenAmount::new(100));
        // 100 of 1000 total
        assert_eq!(stats.delegated_share_bps, 1000);

        let stats = calc.account_stats(&addr(4)).unwrap();
        assert_eq!(stats.delegate, Some(addr(2)));
        assert!(stats.is_delegating);
        assert_eq!(stats.delegator_count, 0);
        assert_eq!(stats.delegated_share_bps, 0);
    }
}
