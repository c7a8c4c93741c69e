//! Integration test: many threads sharing one deployment.
//!
//! Operations are serialized by the protocol handle, so the final state
//! must equal what the same operations produce in any sequential order:
//! every deposit is accounted for exactly once and the ledgers agree.

use std::sync::Arc;
use std::thread;

use yieldopt_ledger::LedgerError;
use yieldopt_staking::{FixedRateEmission, ManualClock};
use yieldopt_types::{AccountId, Amount};
use yieldopt_vault::{bootstrap, BootstrapParams, YieldOptimizer};

const THREADS: usize = 8;
const ROUNDS: usize = 50;
const DEPOSIT: Amount = 100;

fn shared_deployment(clock: &ManualClock) -> Arc<YieldOptimizer> {
    let deployer = AccountId::from_label("deployer");
    let params = BootstrapParams {
        initial_mint: 10_000_000,
        reward_funding: 1_000_000,
        ..Default::default()
    };
    let optimizer = bootstrap(
        deployer,
        &params,
        Box::new(FixedRateEmission::new(0)),
        Arc::new(clock.clone()),
    )
    .expect("bootstrap");
    let vault = optimizer.vault_identity().expect("vault");
    optimizer
        .with_deployment(|d| {
            for i in 0..THREADS {
                let user = AccountId::from_label(&format!("worker-{i}"));
                d.assets.transfer(&deployer, &user, 100_000)?;
                d.assets.approve(&user, &vault, Amount::MAX);
            }
            Ok::<_, LedgerError>(())
        })
        .expect("lock")
        .expect("fund");
    Arc::new(optimizer)
}

#[test]
fn concurrent_deposits_are_all_counted() {
    let clock = ManualClock::new(1_700_000_000);
    let optimizer = shared_deployment(&clock);

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let optimizer = Arc::clone(&optimizer);
            thread::spawn(move || {
                let user = AccountId::from_label(&format!("worker-{i}"));
                for _ in 0..ROUNDS {
                    assert_eq!(optimizer.deposit(&user, DEPOSIT).expect("deposit"), DEPOSIT);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }

    let expected = DEPOSIT * (THREADS * ROUNDS) as Amount;
    let state = optimizer.vault_state().expect("state");
    assert_eq!(state.total_shares, expected);
    assert_eq!(state.total_underlying_principal, expected);
    optimizer.check_invariants().expect("invariants");
}

#[test]
fn concurrent_mixed_operations_keep_invariants() {
    let clock = ManualClock::new(1_700_000_000);
    let optimizer = shared_deployment(&clock);

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let optimizer = Arc::clone(&optimizer);
            thread::spawn(move || {
                let user = AccountId::from_label(&format!("worker-{i}"));
                for round in 0..ROUNDS {
                    let shares = optimizer.deposit(&user, DEPOSIT).expect("deposit");
                    if round % 3 == 0 {
                        optimizer.compound(&user).expect("compound");
                    }
                    if round % 2 == 0 {
                        optimizer.withdraw(&user, shares).expect("withdraw");
                    }
                    optimizer.check_invariants().expect("invariants mid-run");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }

    // Half the rounds withdrew exactly what they deposited at 1:1.
    let kept = DEPOSIT * (THREADS * ROUNDS / 2) as Amount;
    let state = optimizer.vault_state().expect("state");
    assert_eq!(state.total_shares, kept);
    assert_eq!(state.total_underlying_principal, kept);
    optimizer.check_invariants().expect("invariants");
}
