//! Tiered rate calculator.
//!
//! Prices usage against a [`ThresholdTable`] given how many units the account
//! has already consumed in the current package period, and estimates how many
//! more units a balance can buy.
//!
//! All arithmetic saturates. A saturated cost is larger than any balance the
//! ledger can hold, so it is always rejected as insufficient.

use crate::{CreditTransaction, ThresholdTable};

/// Pure pricing functions over one threshold table.
///
/// A package has one calculator per usage type.
#[derive(Debug, Clone, Copy)]
pub struct TieredRateCalculator<'a> {
    table: &'a ThresholdTable,
}

impl<'a> TieredRateCalculator<'a> {
    /// Create a calculator over `table`.
    #[must_use]
    pub const fn new(table: &'a ThresholdTable) -> Self {
        Self { table }
    }

    /// Credits needed for `additional` units after `already_consumed` units.
    ///
    /// Units fill the current tier first and spill into the following tiers
    /// at their rates; everything past the last bounded tier is priced at the
    /// terminal rate.
    #[must_use]
    pub fn cost_for_additional_units(&self, already_consumed: u64, additional: u64) -> u64 {
        let mut cursor = self.table.cursor_at(already_consumed);
        let mut left = additional;
        let mut credits = 0u64;

        while left > 0 {
            let rate = cursor.rate();
            let Some(room) = cursor.remaining() else {
                credits = credits.saturating_add(left.saturating_mul(rate));
                break;
            };
            let take = left.min(room);
            credits = credits.saturating_add(take.saturating_mul(rate));
            left -= take;
            cursor.advance();
        }

        credits
    }

    /// Units `balance` can still buy, given the usage transactions recorded
    /// since the period started. Fractional units are dropped.
    #[must_use]
    pub fn remaining_units_for_balance(&self, balance: i64, history: &[CreditTransaction]) -> u64 {
        let consumed = history
            .iter()
            .filter_map(|tx| tx.units)
            .fold(0u64, u64::saturating_add);
        self.remaining_units_after(balance, consumed)
    }

    /// Units `balance` can still buy after `consumed` units.
    ///
    /// Each tier's remaining capacity is bought outright while the balance
    /// covers it; the first tier it cannot cover (or the terminal tier) takes
    /// whatever whole units the leftover balance pays for.
    #[must_use]
    pub fn remaining_units_after(&self, balance: i64, consumed: u64) -> u64 {
        let mut budget = u64::try_from(balance).unwrap_or(0);
        let mut units = 0u64;
        let mut cursor = self.table.cursor_at(consumed);

        loop {
            let rate = cursor.rate();
            let Some(room) = cursor.remaining() else {
                return units.saturating_add(budget / rate);
            };
            let full_tier = room.saturating_mul(rate);
            if budget < full_tier {
                return units.saturating_add(budget / rate);
            }
            budget -= full_tier;
            units = units.saturating_add(room);
            cursor.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountId, ReferenceId, Tier, UsageType};

    /// Units 0..100 at 10, 100..150 at 8, 150.. at 5.
    fn three_tier() -> ThresholdTable {
        ThresholdTable::new(vec![
            Tier::bounded(100, 10),
            Tier::bounded(50, 8),
            Tier::unbounded(5),
        ])
        .unwrap()
    }

    fn sms_history(units: &[u64]) -> Vec<CreditTransaction> {
        let account_id = AccountId::generate();
        units
            .iter()
            .map(|&u| {
                CreditTransaction::usage(
                    account_id,
                    UsageType::Sms,
                    1,
                    0,
                    Some(u),
                    ReferenceId::generate(),
                    serde_json::Value::Null,
                )
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // cost_for_additional_units
    // ------------------------------------------------------------------

    #[test]
    fn zero_units_cost_nothing() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.cost_for_additional_units(0, 0), 0);
        assert_eq!(calc.cost_for_additional_units(99, 0), 0);
        assert_eq!(calc.cost_for_additional_units(10_000, 0), 0);

        let flat = ThresholdTable::flat(7).unwrap();
        assert_eq!(TieredRateCalculator::new(&flat).cost_for_additional_units(0, 0), 0);
    }

    #[test]
    fn crossing_into_terminal_tier() {
        let table = ThresholdTable::new(vec![Tier::bounded(500, 85), Tier::unbounded(74)]).unwrap();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.cost_for_additional_units(499, 2), 85 + 74);
        assert_eq!(calc.cost_for_additional_units(499, 1), 85);
        assert_eq!(calc.cost_for_additional_units(500, 1), 74);
        assert_eq!(calc.cost_for_additional_units(0, 500), 500 * 85);
        assert_eq!(calc.cost_for_additional_units(0, 501), 500 * 85 + 74);
    }

    #[test]
    fn first_tier_edges() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.cost_for_additional_units(0, 1), 10);
        assert_eq!(calc.cost_for_additional_units(0, 100), 1000);
        assert_eq!(calc.cost_for_additional_units(0, 101), 1008);
        assert_eq!(calc.cost_for_additional_units(99, 1), 10);
        assert_eq!(calc.cost_for_additional_units(99, 2), 18);
    }

    #[test]
    fn middle_tier_edges() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.cost_for_additional_units(100, 1), 8);
        assert_eq!(calc.cost_for_additional_units(100, 50), 400);
        assert_eq!(calc.cost_for_additional_units(100, 51), 405);
        assert_eq!(calc.cost_for_additional_units(149, 1), 8);
        assert_eq!(calc.cost_for_additional_units(149, 2), 13);
    }

    #[test]
    fn spanning_every_tier() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        // 100 * 10 + 50 * 8 + 50 * 5
        assert_eq!(calc.cost_for_additional_units(0, 200), 1650);
        // 1 * 10 + 50 * 8 + 9 * 5
        assert_eq!(calc.cost_for_additional_units(99, 60), 455);
    }

    #[test]
    fn terminal_tier_is_flat() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.cost_for_additional_units(150, 1), 5);
        assert_eq!(calc.cost_for_additional_units(10_000, 3), 15);
        assert_eq!(calc.cost_for_additional_units(u64::MAX, 2), 10);
    }

    #[test]
    fn cost_saturates_instead_of_wrapping() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.cost_for_additional_units(0, u64::MAX), u64::MAX);
    }

    #[test]
    fn cost_is_monotonic_in_additional_units() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        for already in [0, 1, 50, 99, 100, 101, 149, 150, 151, 400] {
            let mut previous = 0;
            for additional in 0..=260 {
                let cost = calc.cost_for_additional_units(already, additional);
                assert!(
                    cost >= previous,
                    "cost dropped at already={already} additional={additional}"
                );
                previous = cost;
            }
        }
    }

    #[test]
    fn splitting_a_purchase_does_not_change_its_cost() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        for already in (0..=200).step_by(7) {
            for first in 0..=60 {
                for second in [0, 1, 13, 49, 50, 51, 120] {
                    let whole = calc.cost_for_additional_units(already, first + second);
                    let split = calc.cost_for_additional_units(already, first)
                        + calc.cost_for_additional_units(already + first, second);
                    assert_eq!(whole, split, "already={already} first={first} second={second}");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // remaining_units_for_balance
    // ------------------------------------------------------------------

    #[test]
    fn empty_balance_buys_nothing() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.remaining_units_for_balance(0, &[]), 0);
        assert_eq!(calc.remaining_units_for_balance(-50, &[]), 0);
    }

    #[test]
    fn remaining_within_first_tier() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        assert_eq!(calc.remaining_units_for_balance(9, &[]), 0);
        assert_eq!(calc.remaining_units_for_balance(10, &[]), 1);
        assert_eq!(calc.remaining_units_for_balance(999, &[]), 99);
    }

    #[test]
    fn remaining_at_exact_tier_cost() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        // Exactly pays tier one; nothing left for tier two.
        assert_eq!(calc.remaining_units_for_balance(1000, &[]), 100);
        assert_eq!(calc.remaining_units_for_balance(1007, &[]), 100);
        assert_eq!(calc.remaining_units_for_balance(1008, &[]), 101);
        // Pays tiers one and two exactly.
        assert_eq!(calc.remaining_units_for_balance(1400, &[]), 150);
        assert_eq!(calc.remaining_units_for_balance(1407, &[]), 151);
    }

    #[test]
    fn remaining_replays_history_to_find_tier() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        // 120 units consumed: 30 left in tier two (240 credits), then 60 / 5.
        let history = sms_history(&[70, 50]);
        assert_eq!(calc.remaining_units_for_balance(300, &history), 42);

        // Deep in the terminal tier.
        let history = sms_history(&[1_000]);
        assert_eq!(calc.remaining_units_for_balance(52, &history), 10);
    }

    #[test]
    fn remaining_ignores_transactions_without_units() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        let mut history = sms_history(&[100]);
        history[0].units = None;
        assert_eq!(calc.remaining_units_for_balance(100, &history), 10);
    }

    #[test]
    fn remaining_units_are_affordable_and_maximal() {
        let table = three_tier();
        let calc = TieredRateCalculator::new(&table);
        for consumed in [0, 1, 99, 100, 120, 149, 150, 500] {
            for balance in (0..=2_500).step_by(3) {
                let units = calc.remaining_units_after(balance, consumed);
                let budget = u64::try_from(balance).unwrap();
                assert!(
                    calc.cost_for_additional_units(consumed, units) <= budget,
                    "consumed={consumed} balance={balance} units={units}"
                );
                assert!(
                    calc.cost_for_additional_units(consumed, units + 1) > budget,
                    "consumed={consumed} balance={balance} units={units}"
                );
            }
        }
    }
}
