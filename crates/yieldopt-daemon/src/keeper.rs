//! Periodic compounding.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use yieldopt_types::Amount;
use yieldopt_vault::VaultError;

use crate::events::Event;
use crate::DaemonState;

/// Call `compound` as the keeper every `interval`, forever.
pub async fn run(state: Arc<DaemonState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), keeper = %state.keeper.short(), "keeper started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    let mut streak = FailureStreak::default();
    loop {
        ticker.tick().await;
        streak.observe(&compound_once(&state));
    }
}

/// Consecutive failed keeper rounds. Crossing [`FailureStreak::ALERT_AFTER`]
/// is logged once at error level; a success resets the count.
#[derive(Debug, Default)]
pub struct FailureStreak {
    failures: u32,
}

impl FailureStreak {
    /// Failed rounds in a row before the streak is escalated.
    pub const ALERT_AFTER: u32 = 3;

    /// Record one round's outcome and return the current streak.
    pub fn observe(&mut self, outcome: &Result<Amount, VaultError>) -> u32 {
        match outcome {
            Ok(_) => {
                if self.failures >= Self::ALERT_AFTER {
                    info!(failures = self.failures, "keeper recovered");
                }
                self.failures = 0;
            }
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures == Self::ALERT_AFTER {
                    error!(failures = self.failures, %err, "keeper compound keeps failing");
                }
            }
        }
        self.failures
    }
}

/// One keeper round. Failures are logged, never retried early.
pub fn compound_once(state: &DaemonState) -> Result<Amount, VaultError> {
    match state.optimizer.compound(&state.keeper) {
        Ok(0) => {
            debug!("keeper: nothing to compound");
            Ok(0)
        }
        Ok(reinvested) => {
            emit_compounded(state, &state.keeper.to_string(), reinvested);
            Ok(reinvested)
        }
        Err(err) => {
            warn!(%err, "keeper compound failed");
            Err(err)
        }
    }
}

/// Publish a `Compounded` event with the rate after reinvesting.
pub fn emit_compounded(state: &DaemonState, caller: &str, reinvested: Amount) {
    let rate = state.optimizer.exchange_rate().ok();
    state.event_bus.emit(Event::now(
        "Compounded",
        serde_json::json!({
            "caller": caller,
            "reinvested": reinvested.to_string(),
            "total_underlying_principal": rate.map(|r| r.total_underlying_principal.to_string()),
            "total_shares": rate.map(|r| r.total_shares.to_string()),
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use yieldopt_staking::ManualClock;
    use yieldopt_types::AccountId;

    fn state(restrict: bool) -> (DaemonState, ManualClock) {
        let clock = ManualClock::new(1_700_000_000);
        let mut config = DaemonConfig::default();
        config.keeper.restrict_compound = restrict;
        config.staking.reward_per_second = 10;
        let state = DaemonState::new(config, Arc::new(clock.clone())).expect("state");
        (state, clock)
    }

    fn deposit(state: &DaemonState, amount: Amount) {
        let vault = state.optimizer.vault_identity().expect("vault");
        let deployer = state.deployer;
        state
            .optimizer
            .with_deployment(|d| d.assets.approve(&deployer, &vault, amount))
            .expect("approve");
        state.optimizer.deposit(&deployer, amount).expect("deposit");
    }

    #[test]
    fn test_keeper_round_compounds_and_emits() {
        let (state, clock) = state(true);
        let mut rx = state.event_bus.subscribe();
        deposit(&state, 1_000);
        clock.advance(5);

        assert_eq!(compound_once(&state).expect("compound"), 50);
        let event = rx.try_recv().expect("event");
        assert_eq!(event.event_type, "Compounded");
        assert_eq!(event.payload["reinvested"], "50");
        assert_eq!(event.payload["total_underlying_principal"], "1050");
    }

    #[test]
    fn test_idle_round_emits_nothing() {
        let (state, _) = state(false);
        assert_eq!(compound_once(&state).expect("empty"), 0);
        assert_eq!(state.event_bus.sequence(), 0);
    }

    #[test]
    fn test_failure_streak_counts_and_resets() {
        let mut streak = FailureStreak::default();
        let failed: Result<Amount, VaultError> = Err(VaultError::Reentrant);
        for expected in 1..=FailureStreak::ALERT_AFTER + 1 {
            assert_eq!(streak.observe(&failed), expected);
        }
        assert_eq!(streak.observe(&Ok(0)), 0);
        assert_eq!(streak.observe(&failed), 1);
    }

    #[test]
    fn test_unauthorized_round_counts_as_failure() {
        let (state, clock) = state(false);
        deposit(&state, 1_000);
        clock.advance(5);
        state
            .optimizer
            .with_deployment(|d| {
                let vault = *d.vault.identity();
                d.staking.transfer_ownership(&vault, AccountId::from_label("elsewhere"))
            })
            .expect("lock")
            .expect("hand authority away");

        let mut streak = FailureStreak::default();
        assert_eq!(streak.observe(&compound_once(&state)), 1);
        assert_eq!(state.event_bus.sequence(), 0);
    }
}
