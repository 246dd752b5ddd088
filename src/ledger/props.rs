//! Property-based tests over generated operation scripts.
//!
//! Scripts come from the seeded generator, so every failing case shrinks to a
//! seed and a handful of sizes that can be replayed with `revshare-gen`.

use proptest::prelude::*;

use super::{IndexedLedger, NaiveLedger, RevenueLedger, Strategy as LedgerStrategy};
use crate::script::{compare, generate, replay, settle, GeneratorConfig, Operation, Script};

const TOLERANCE: f64 = 1e-6;

prop_compose! {
    fn arb_script(max_operations: usize)(
        seed in any::<u64>(),
        accounts in 1usize..24,
        initial_accounts in 0usize..12,
        operations in 1usize..max_operations,
        invalid_ratio in 0.0f64..0.2,
        fractional in any::<bool>(),
    ) -> Script {
        generate(&GeneratorConfig {
            accounts,
            initial_accounts,
            operations,
            seed,
            invalid_ratio,
            fractional,
            ..GeneratorConfig::default()
        })
    }
}

fn assert_stakes_non_negative<L: RevenueLedger + ?Sized>(ledger: &L) -> Result<(), TestCaseError> {
    prop_assert!(ledger.total_stake() >= 0.0);
    for account in ledger.accounts() {
        prop_assert!(ledger.stake_of(&account) >= 0.0, "{account} went negative");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Settled revenue sums to the revenue injected, for both strategies.
    #[test]
    fn prop_revenue_is_conserved(script in arb_script(300)) {
        for strategy in [LedgerStrategy::Naive, LedgerStrategy::Indexed] {
            let (mut ledger, report) = script.run(strategy).unwrap();
            settle(&mut *ledger).unwrap();
            let settled = ledger.snapshot().total_settled_revenue();
            let bound = TOLERANCE * report.injected.max(1.0);
            prop_assert!(
                (settled - report.injected).abs() <= bound,
                "{strategy}: settled {settled}, injected {}",
                report.injected
            );
        }
    }

    /// Both strategies reject the same operations and settle to the same revenue.
    #[test]
    fn prop_strategies_agree(script in arb_script(300)) {
        let (mut naive, naive_report) = script.run(LedgerStrategy::Naive).unwrap();
        let (mut indexed, indexed_report) = script.run(LedgerStrategy::Indexed).unwrap();
        prop_assert_eq!(&naive_report, &indexed_report);
        prop_assert_eq!(naive.total_stake(), indexed.total_stake());

        // pending revenue must already be visible before any checkpoint
        let early = compare(&*naive, &*indexed, naive_report.injected, TOLERANCE);
        for account in indexed.accounts() {
            let projected = indexed.projected_revenue(&account);
            let expected = naive.settled_revenue(&account);
            prop_assert!((projected - expected).abs() <= early.bound);
        }

        settle(&mut *naive).unwrap();
        settle(&mut *indexed).unwrap();
        let comparison = compare(&*naive, &*indexed, naive_report.injected, TOLERANCE);
        prop_assert!(comparison.is_consistent(), "{:?}", comparison);
    }

    #[test]
    fn prop_stakes_never_negative(script in arb_script(200)) {
        let mut naive = NaiveLedger::new(script.initial.clone()).unwrap();
        let mut indexed = IndexedLedger::new(script.initial.clone()).unwrap();
        for operation in &script.operations {
            let _ = operation.apply(&mut naive);
            let _ = operation.apply(&mut indexed);
            assert_stakes_non_negative(&naive)?;
            assert_stakes_non_negative(&indexed)?;
        }
    }

    /// A rejected call leaves every stored field bit-for-bit unchanged.
    #[test]
    fn prop_rejection_is_a_no_op(script in arb_script(200)) {
        let mut naive = NaiveLedger::new(script.initial.clone()).unwrap();
        let mut indexed = IndexedLedger::new(script.initial.clone()).unwrap();
        for operation in &script.operations {
            let naive_before = naive.snapshot().fingerprint();
            let indexed_before = indexed.snapshot().fingerprint();
            let naive_result = operation.apply(&mut naive);
            let indexed_result = operation.apply(&mut indexed);
            prop_assert_eq!(&naive_result, &indexed_result);
            if naive_result.is_err() {
                prop_assert_eq!(naive.snapshot().fingerprint(), naive_before);
                prop_assert_eq!(indexed.snapshot().fingerprint(), indexed_before);
            }
        }
    }

    /// Adding and then removing the same stake does not change who earns what.
    #[test]
    fn prop_zero_sum_edit_is_invisible(
        script in arb_script(150),
        account in 0usize..24,
        amount in 1u64..1_000,
        revenue in 1u64..10_000,
    ) {
        let mut base = IndexedLedger::new(script.initial.clone()).unwrap();
        let mut injected = replay(&mut base, &script.operations).injected;
        let mut edited = base.clone();
        let id = crate::script::generate::account_id(account);
        let x = amount as f64;
        edited.change_share(&id, x).unwrap();
        edited.change_share(&id, -x).unwrap();
        let drift = (edited.total_stake() - base.total_stake()).abs();
        prop_assert!(drift <= 1e-9 * base.total_stake().max(1.0), "total drifted by {drift}");

        let extra = Operation::AddRevenue { amount: revenue as f64 };
        let base_result = extra.apply(&mut base);
        let edited_result = extra.apply(&mut edited);
        prop_assert_eq!(&base_result, &edited_result);

        if base_result.is_ok() {
            injected += revenue as f64;
        }

        settle(&mut base).unwrap();
        settle(&mut edited).unwrap();
        let comparison = compare(&base, &edited, injected, TOLERANCE);
        prop_assert!(comparison.divergences.is_empty(), "{:?}", comparison.divergences);
    }
}

/// Long mixed sequences keep the indexed ledger within tolerance of the naive one.
#[test]
fn drift_stays_bounded_over_long_sequences() {
    for (seed, fractional) in [(1, false), (2, false), (3, true), (4, true)] {
        let script = generate(&GeneratorConfig {
            accounts: 32,
            initial_accounts: 16,
            operations: 20_000,
            seed,
            fractional,
            ..GeneratorConfig::default()
        });
        let (mut naive, report) = script.run(LedgerStrategy::Naive).unwrap();
        let (mut indexed, _) = script.run(LedgerStrategy::Indexed).unwrap();
        settle(&mut *naive).unwrap();
        settle(&mut *indexed).unwrap();
        let comparison = compare(&*naive, &*indexed, report.injected, TOLERANCE);
        assert!(
            comparison.is_consistent(),
            "seed {seed} fractional {fractional}: {comparison:?}"
        );
    }
}

/// Small pools that empty often, with fractional stakes, stay equivalent.
#[test]
fn fractional_pools_that_empty_stay_equivalent() {
    for seed in 0..40 {
        let script = generate(&GeneratorConfig {
            accounts: 4,
            initial_accounts: 4,
            operations: 2_000,
            seed,
            fractional: true,
            ..GeneratorConfig::default()
        });
        let (mut naive, report) = script.run(LedgerStrategy::Naive).unwrap();
        let (mut indexed, indexed_report) = script.run(LedgerStrategy::Indexed).unwrap();
        assert_eq!(report, indexed_report, "seed {seed}");
        settle(&mut *naive).unwrap();
        settle(&mut *indexed).unwrap();
        let comparison = compare(&*naive, &*indexed, report.injected, TOLERANCE);
        assert!(comparison.is_consistent(), "seed {seed}: {comparison:?}");
    }
}
