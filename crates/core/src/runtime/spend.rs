//! Rolling 24-hour spend guard.
//!
//! This is a single process-wide ledger of timestamped charges, not a
//! per-agent calendar-day tracker. `spent24h` is always "sum of charges
//! in the last 24 hours", not "since UTC midnight" — so a burst of spend
//! at 23:50 still counts against the budget at 00:10 the next day.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use sa_domain::config::EconomyConfig;

fn window() -> chrono::Duration {
    chrono::Duration::hours(24)
}

struct Charge {
    at: DateTime<Utc>,
    amount_usd: f64,
}

/// Snapshot handed back to the guard stack and to `GET chat/run-config`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpendStatus {
    pub daily_budget_usd: Option<f64>,
    pub spent_24h: f64,
    pub remaining: Option<f64>,
    pub exceeded: bool,
    pub auto_pause_on_limit: bool,
    pub paused: bool,
}

/// Process-wide rolling-window spend ledger.
pub struct SpendGuard {
    default_budget_usd: Option<f64>,
    default_auto_pause: bool,
    charges: Mutex<VecDeque<Charge>>,
    paused: Mutex<bool>,
}

impl SpendGuard {
    pub fn new(economy: EconomyConfig) -> Self {
        Self {
            default_budget_usd: economy.daily_budget_usd,
            default_auto_pause: economy.auto_pause_on_limit,
            charges: Mutex::new(VecDeque::new()),
            paused: Mutex::new(false),
        }
    }

    /// Drop charges older than the 24h window and sum what remains.
    fn spent_24h_locked(&self, charges: &mut VecDeque<Charge>) -> f64 {
        let cutoff = Utc::now() - window();
        while let Some(front) = charges.front() {
            if front.at < cutoff {
                charges.pop_front();
            } else {
                break;
            }
        }
        charges.iter().map(|c| c.amount_usd).sum()
    }

    /// Snapshot current spend against the given live budget knobs (read
    /// from `RuntimeConfig`, since those can be changed at runtime
    /// independent of the boot-time `EconomyConfig` this guard was built
    /// from).
    pub fn status(&self, daily_budget_usd: Option<f64>, auto_pause_on_limit: bool) -> SpendStatus {
        let mut charges = self.charges.lock();
        let spent_24h = self.spent_24h_locked(&mut charges);
        let remaining = daily_budget_usd.map(|b| (b - spent_24h).max(0.0));
        let exceeded = daily_budget_usd.is_some_and(|b| spent_24h >= b);

        if exceeded && auto_pause_on_limit {
            *self.paused.lock() = true;
        }

        SpendStatus {
            daily_budget_usd,
            spent_24h,
            remaining,
            exceeded,
            auto_pause_on_limit,
            paused: *self.paused.lock(),
        }
    }

    /// Snapshot using the boot-time defaults this guard was constructed
    /// with, ignoring any live `RuntimeConfig` override.
    pub fn status_default(&self) -> SpendStatus {
        self.status(self.default_budget_usd, self.default_auto_pause)
    }

    /// Record a completed charge against the rolling ledger.
    pub fn record_charge(&self, amount_usd: f64) {
        if amount_usd <= 0.0 {
            return;
        }
        let mut charges = self.charges.lock();
        charges.push_back(Charge {
            at: Utc::now(),
            amount_usd,
        });
        self.spent_24h_locked(&mut charges);
    }

    /// Operator override: lift a budget-triggered pause without waiting for
    /// the window to roll off.
    pub fn resume(&self) {
        *self.paused.lock() = false;
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(budget: Option<f64>, auto_pause: bool) -> SpendGuard {
        SpendGuard::new(EconomyConfig {
            daily_budget_usd: budget,
            auto_pause_on_limit: auto_pause,
            ..Default::default()
        })
    }

    #[test]
    fn no_budget_never_exceeded() {
        let g = guard(None, false);
        g.record_charge(1_000_000.0);
        let status = g.status_default();
        assert!(!status.exceeded);
        assert_eq!(status.remaining, None);
    }

    #[test]
    fn budget_exceeded_flags_and_pauses() {
        let g = guard(Some(10.0), true);
        g.record_charge(6.0);
        g.record_charge(5.0);
        let status = g.status_default();
        assert!(status.exceeded);
        assert!(status.paused);
        assert_eq!(status.remaining, Some(0.0));
    }

    #[test]
    fn exceeded_without_auto_pause_does_not_pause() {
        let g = guard(Some(10.0), false);
        g.record_charge(11.0);
        let status = g.status_default();
        assert!(status.exceeded);
        assert!(!status.paused);
    }

    #[test]
    fn resume_clears_pause() {
        let g = guard(Some(10.0), true);
        g.record_charge(20.0);
        assert!(g.status_default().paused);
        g.resume();
        assert!(!g.is_paused());
    }

    #[test]
    fn zero_and_negative_charges_ignored() {
        let g = guard(Some(10.0), false);
        g.record_charge(0.0);
        g.record_charge(-5.0);
        assert_eq!(g.status_default().spent_24h, 0.0);
    }
}
