//! Token budget accounting per inference provider
//!
//! This module provides:
//! - Monthly allowance tracking per provider
//! - Spend admission with a standing reserve margin
//! - Write-through persistence to `token-budgets.json`
//! - Billing period rollover
//!
//! The in-memory ledger is authoritative for the life of the process. A
//! failed flush is logged and the mutation stands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Default fraction of each allowance that is never spent
pub const DEFAULT_RESERVE_FRACTION: f64 = 0.1;

/// Token budget for a single provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAccount {
    /// Tokens available per billing period
    pub monthly_allowance: u64,
    /// Tokens committed in the current billing period
    #[serde(default)]
    pub used_this_month: u64,
    /// Informational daily ceiling, not enforced
    #[serde(default)]
    pub daily_limit: u64,
}

impl BudgetAccount {
    /// Create an account with nothing spent
    pub fn new(monthly_allowance: u64, daily_limit: u64) -> Self {
        Self {
            monthly_allowance,
            used_this_month: 0,
            daily_limit,
        }
    }

    /// Tokens left before the allowance is exhausted
    pub fn remaining(&self) -> u64 {
        self.monthly_allowance.saturating_sub(self.used_this_month)
    }

    /// Utilization as a percentage (0-100+)
    pub fn utilization_percent(&self) -> f64 {
        if self.monthly_allowance == 0 {
            return 100.0;
        }
        (self.used_this_month as f64 / self.monthly_allowance as f64) * 100.0
    }
}

/// On-disk shape of the ledger
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    budgets: BTreeMap<String, BudgetAccount>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    billing_period: Option<String>,
}

/// Persistent per-provider token ledger
#[derive(Debug, Clone, Default)]
pub struct BudgetLedger {
    /// Backing file; `None` keeps the ledger in memory only
    path: Option<PathBuf>,
    accounts: BTreeMap<String, BudgetAccount>,
    /// Billing period (`YYYY-MM`) the usage counters belong to
    billing_period: Option<String>,
}

fn period_of(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

impl BudgetLedger {
    /// Create a ledger that is never persisted
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a ledger backed by a JSON file
    ///
    /// A missing or unreadable file yields an empty ledger; the error is
    /// logged and the ledger will overwrite the file on its next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match Self::read_file(&path) {
            Ok(Some(file)) => {
                info!(
                    path = %path.display(),
                    providers = file.budgets.len(),
                    "Loaded token budgets"
                );
                file
            }
            Ok(None) => {
                warn!(path = %path.display(), "Budget config not found, starting empty");
                LedgerFile::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load budget config, starting empty");
                LedgerFile::default()
            }
        };

        Self {
            path: Some(path),
            accounts: file.budgets,
            billing_period: file.billing_period,
        }
    }

    fn read_file(path: &Path) -> Result<Option<LedgerFile>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        let file: LedgerFile = serde_json::from_str(&contents)?;
        Ok(Some(file))
    }

    /// Add an account without persisting (builder style, for setup and tests)
    pub fn with_account(mut self, provider: impl Into<String>, account: BudgetAccount) -> Self {
        self.accounts.insert(provider.into(), account);
        self
    }

    /// Provision or replace an account and persist
    pub fn set_account(&mut self, provider: impl Into<String>, account: BudgetAccount) {
        let provider = provider.into();
        info!(provider = %provider, allowance = account.monthly_allowance, "Budget account set");
        self.accounts.insert(provider, account);
        self.persist();
    }

    /// Get an account by provider
    pub fn account(&self, provider: &str) -> Option<&BudgetAccount> {
        self.accounts.get(provider)
    }

    /// All accounts in provider order
    pub fn accounts(&self) -> impl Iterator<Item = (&String, &BudgetAccount)> {
        self.accounts.iter()
    }

    /// Current billing period, if one has been recorded
    pub fn billing_period(&self) -> Option<&str> {
        self.billing_period.as_deref()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Remaining tokens for a provider; unknown providers have none
    pub fn remaining(&self, provider: &str) -> u64 {
        match self.accounts.get(provider) {
            Some(account) => account.remaining(),
            None => {
                warn!(provider, "Unknown provider");
                0
            }
        }
    }

    /// Check whether a spend fits under the allowance minus the reserve
    ///
    /// Admits only if `used + needed <= allowance * (1 - reserve_fraction)`.
    /// A zero-token spend commits nothing and is always admitted for a known
    /// provider, even when usage already sits inside the reserve.
    pub fn can_spend(&self, provider: &str, tokens_needed: u64, reserve_fraction: f64) -> bool {
        let Some(account) = self.accounts.get(provider) else {
            warn!(provider, "Unknown provider");
            return false;
        };

        if tokens_needed == 0 {
            return true;
        }

        let reserve_fraction = reserve_fraction.clamp(0.0, 1.0);
        let safe_spend = account.monthly_allowance as f64 * (1.0 - reserve_fraction);
        let projected = account.used_this_month.saturating_add(tokens_needed);
        let can_afford = projected as f64 <= safe_spend;

        if !can_afford {
            warn!(
                provider,
                needed = tokens_needed,
                remaining = account.remaining(),
                reserve_percent = reserve_fraction * 100.0,
                "Insufficient budget"
            );
        }
        can_afford
    }

    /// Commit a spend against a provider and persist the ledger
    ///
    /// This is the only operation that increases `used_this_month`. It must
    /// be called exactly once per committed execution.
    pub fn record_spend(&mut self, provider: &str, tokens: u64) -> Result<()> {
        let Some(account) = self.accounts.get_mut(provider) else {
            warn!(provider, tokens, "Spend recorded against unknown provider was ignored");
            return Err(Error::UnknownProvider(provider.to_string()));
        };

        account.used_this_month = account.used_this_month.saturating_add(tokens);
        debug!(
            provider,
            tokens,
            used = account.used_this_month,
            "Recorded token spend"
        );
        self.persist();
        Ok(())
    }

    /// Zero every provider's usage counter
    pub fn reset_period(&mut self) {
        for account in self.accounts.values_mut() {
            account.used_this_month = 0;
        }
        info!("Monthly budgets reset");
        self.persist();
    }

    /// Reset usage if `now` falls in a different billing month
    ///
    /// Returns true when a reset happened. The first call on a ledger with no
    /// recorded period only stamps the period.
    pub fn roll_period(&mut self, now: DateTime<Utc>) -> bool {
        let current = period_of(now);
        match self.billing_period.clone() {
            Some(period) if period == current => false,
            Some(period) => {
                info!(from = %period, to = %current, "Billing period rolled over");
                self.billing_period = Some(current);
                self.reset_period();
                true
            }
            None => {
                self.billing_period = Some(current);
                self.persist();
                false
            }
        }
    }

    /// Utilization of one provider (0-100+); unknown providers report 0
    pub fn utilization_percent(&self, provider: &str) -> f64 {
        self.accounts
            .get(provider)
            .map(BudgetAccount::utilization_percent)
            .unwrap_or(0.0)
    }

    /// Utilization across every provider
    ///
    /// An empty ledger, or one with no allowance at all, reports 100 so the
    /// admission gate fails safe.
    pub fn aggregate_utilization_percent(&self) -> f64 {
        let allowance: u64 = self.accounts.values().map(|a| a.monthly_allowance).sum();
        if allowance == 0 {
            return 100.0;
        }
        let used: u64 = self.accounts.values().map(|a| a.used_this_month).sum();
        (used as f64 / allowance as f64) * 100.0
    }

    /// Informational daily limit for a provider
    pub fn daily_limit(&self, provider: &str) -> u64 {
        self.accounts
            .get(provider)
            .map(|a| a.daily_limit)
            .unwrap_or(0)
    }

    /// Write the full ledger to its backing file, logging any failure
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.write_to(path) {
            error!(path = %path.display(), error = %e, "Failed to save budgets");
        }
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let file = LedgerFile {
            budgets: self.accounts.clone(),
            last_updated: Some(Utc::now()),
            billing_period: self.billing_period.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .map_err(|e| Error::PersistenceFailed(tmp.display().to_string(), e.to_string()))?;
        fs::rename(&tmp, path)
            .map_err(|e| Error::PersistenceFailed(path.display().to_string(), e.to_string()))?;
        Ok(())
    }
}
