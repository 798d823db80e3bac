//! Ledger store
//!
//! One async mutex per account serializes every read and write of that
//! account. The account map itself is only locked long enough to find or
//! insert a handle, so unrelated accounts never contend.

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, Asset};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::account::{AccountSnapshot, AccountState};
use crate::balance::{BalanceDelta, BalanceKind};
use crate::error::LedgerError;
use crate::journal::{JournalSink, LedgerEvent, LedgerEventKind, MemoryJournal};
use crate::pool::LiquidityPool;

type AccountHandle = Arc<Mutex<AccountState>>;
type AccountMap = Arc<RwLock<HashMap<AccountId, AccountHandle>>>;

/// In-memory ledger of all accounts
pub struct LedgerStore {
    accounts: AccountMap,
    pool: LiquidityPool,
    journal: Arc<dyn JournalSink>,
}

impl LedgerStore {
    pub fn new(journal: Arc<dyn JournalSink>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            pool: LiquidityPool::new(),
            journal,
        }
    }

    /// Store backed by a fresh `MemoryJournal`
    pub fn in_memory() -> (Self, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        (Self::new(journal.clone()), journal)
    }

    pub fn pool(&self) -> &LiquidityPool {
        &self.pool
    }

    /// Cash currently available for savings withdrawals of `asset`
    pub fn pool_liquidity(&self, asset: &Asset) -> Decimal {
        self.pool.available(asset)
    }

    fn handle(&self, account: &AccountId) -> Option<AccountHandle> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .cloned()
    }

    fn handle_or_create(&self, account: &AccountId) -> AccountHandle {
        if let Some(handle) = self.handle(account) {
            return handle;
        }
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(AccountState::new(account.clone()))))
            .clone()
    }

    /// Acquire exclusive access to an account, creating its record if needed
    ///
    /// A record that still has no balances and no interest history when the
    /// guard is released is dropped again, so lookups of unknown ids leave no
    /// trace.
    pub async fn lock(&self, account: &AccountId) -> AccountGuard {
        let handle = self.handle_or_create(account);
        AccountGuard {
            state: handle.lock_owned().await,
            journal: self.journal.clone(),
            accounts: self.accounts.clone(),
        }
    }

    /// Number of account records held, active or not
    pub fn record_count(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Consistent snapshot of one account
    pub async fn get(&self, account: &AccountId) -> AccountSnapshot {
        match self.handle(account) {
            Some(handle) => handle.lock().await.snapshot(),
            None => AccountSnapshot::empty(account.clone()),
        }
    }

    /// Atomically apply `delta` to `account`
    pub async fn apply_delta(
        &self,
        account: &AccountId,
        delta: &BalanceDelta,
        at: DateTime<Utc>,
    ) -> Result<AccountSnapshot, LedgerError> {
        let mut guard = self.lock(account).await;
        guard.apply_delta(delta, at)
    }

    /// Accounts holding at least one balance
    pub async fn accounts(&self) -> Vec<AccountId> {
        let handles: Vec<(AccountId, AccountHandle)> = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        let mut active = Vec::new();
        for (id, handle) in handles {
            if handle.lock().await.is_active() {
                active.push(id);
            }
        }
        active.sort();
        active
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::in_memory().0
    }
}

/// Exclusive access to one account
///
/// Every mutation made through the guard is journaled before it returns.
pub struct AccountGuard {
    state: OwnedMutexGuard<AccountState>,
    journal: Arc<dyn JournalSink>,
    accounts: AccountMap,
}

impl AccountGuard {
    pub fn id(&self) -> &AccountId {
        self.state.id()
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.state.snapshot()
    }

    /// Post-delta view, nothing committed
    pub fn project(&self, delta: &BalanceDelta) -> Result<AccountSnapshot, LedgerError> {
        self.state.project(delta)
    }

    pub fn apply_delta(
        &mut self,
        delta: &BalanceDelta,
        at: DateTime<Utc>,
    ) -> Result<AccountSnapshot, LedgerError> {
        self.state.apply(delta, at)?;

        let lines = delta.lines();
        if !lines.is_empty() {
            tracing::debug!(account = %self.state.id(), lines = lines.len(), "delta committed");
            self.journal.record(LedgerEvent::new(
                self.state.id().clone(),
                at,
                LedgerEventKind::Delta { lines },
            ));
        }

        Ok(self.state.snapshot())
    }

    /// Credit accrued interest and advance the accrual timestamp to `now`
    pub fn record_accrual(
        &mut self,
        kind: BalanceKind,
        asset: &Asset,
        interest: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let balance_after = self.state.record_accrual(kind, asset, interest, now)?;

        if !interest.is_zero() {
            self.journal.record(LedgerEvent::new(
                self.state.id().clone(),
                now,
                LedgerEventKind::InterestAccrued {
                    kind,
                    asset: asset.clone(),
                    interest,
                    balance_after,
                },
            ));
        }

        Ok(balance_after)
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        if !self.state.is_pristine() {
            return;
        }

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let handle = OwnedMutexGuard::mutex(&self.state);
        // The map and this guard are the only holders: nobody is queued on the lock
        let unshared = Arc::strong_count(handle) == 2
            && accounts
                .get(self.state.id())
                .is_some_and(|current| Arc::ptr_eq(current, handle));
        if unshared {
            let id = self.state.id().clone();
            accounts.remove(&id);
        }
    }
}
