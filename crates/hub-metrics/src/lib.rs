#![deny(warnings)]

//! Derived metrics for the affiliate hub.
//!
//! This crate turns raw result rows into conversion rates, commission and
//! investment totals, CAC in local and hard currency, and the quarter/lever
//! rollups the reporting views consume. Aggregate CAC is always a ratio of
//! sums over confirmed rows, never a mean of per-row CACs.

use hub_core::{CategorySet, LeverKey, Quarter, ResultRow};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Fixed commission per net paying subscriber, in COP.
pub const COMMISSION_PER_NP: i64 = 43_575;

/// Fixed exchange rate used for hard-currency CAC.
pub const COP_PER_USD: i64 = 3_700;

/// Commission owed for a row's NPs, zero when commission is turned off.
pub fn commission(nps: i64, has_commission: bool) -> i64 {
    if has_commission {
        COMMISSION_PER_NP * nps.max(0)
    } else {
        0
    }
}

/// Total investment for one row: fixed + variable + commission + ad spend.
pub fn total_investment(row: &ResultRow) -> i64 {
    row.fixed + row.variable + commission(row.nps, row.has_commission) + row.pauta
}

/// A percentage to one decimal place; zero when the divisor is zero.
fn pct(num: i64, den: i64) -> Decimal {
    if den == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(num) * Decimal::from(100) / Decimal::from(den)).round_dp(1)
    }
}

/// Direction of the NPs-vs-projection delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn of(delta: i64) -> Trend {
        match delta {
            d if d > 0 => Trend::Up,
            d if d < 0 => Trend::Down,
            _ => Trend::Flat,
        }
    }
}

/// All derived fields for one result row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RowMetrics {
    /// attendees / wa_group, percent to one decimal.
    pub attendance_rate: Decimal,
    /// trials / wa_group, percent to one decimal.
    pub trial_rate: Decimal,
    /// nps / trials, percent to one decimal.
    pub nps_conversion: Decimal,
    pub commission: i64,
    pub total_investment: i64,
    /// round(total_investment / nps) in COP; zero when nps is zero.
    pub cac_local: i64,
    /// cac_local / COP_PER_USD.
    pub cac_hard: Decimal,
    pub delta: i64,
    pub trend: Trend,
}

impl RowMetrics {
    pub fn of(row: &ResultRow) -> RowMetrics {
        let commission = commission(row.nps, row.has_commission);
        let total = total_investment(row);
        let cac_local = if row.nps > 0 {
            (Decimal::from(total) / Decimal::from(row.nps))
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(0)
        } else {
            0
        };
        let delta = row.nps - row.projected_nps;
        RowMetrics {
            attendance_rate: pct(row.attendees, row.wa_group),
            trial_rate: pct(row.trials, row.wa_group),
            nps_conversion: pct(row.nps, row.trials),
            commission,
            total_investment: total,
            cac_local,
            cac_hard: Decimal::from(cac_local) / Decimal::from(COP_PER_USD),
            delta,
            trend: Trend::of(delta),
        }
    }
}

/// Hard-currency CAC as a ratio of sums: investment / nps / COP_PER_USD,
/// zero when there are no NPs to divide by.
pub fn cac_usd(investment: i64, nps: i64) -> Decimal {
    if nps <= 0 {
        Decimal::ZERO
    } else {
        Decimal::from(investment) / Decimal::from(nps) / Decimal::from(COP_PER_USD)
    }
}

/// Sum of total investment over confirmed rows. Unconfirmed rows contribute
/// nothing to any CAC numerator.
pub fn confirmed_investment<'a, I: IntoIterator<Item = &'a ResultRow>>(rows: I) -> i64 {
    rows.into_iter()
        .filter(|r| r.confirmed)
        .map(total_investment)
        .sum()
}

/// Sum of NPs over confirmed rows.
pub fn confirmed_nps<'a, I: IntoIterator<Item = &'a ResultRow>>(rows: I) -> i64 {
    rows.into_iter().filter(|r| r.confirmed).map(|r| r.nps).sum()
}

/// Sum of NPs over every row in the subset.
pub fn nps_sum<'a, I: IntoIterator<Item = &'a ResultRow>>(rows: I) -> i64 {
    rows.into_iter().map(|r| r.nps).sum()
}

/// Sum of projected NPs over unconfirmed rows only: once a row is
/// confirmed its NPs are real and leave the projection.
pub fn projected_sum<'a, I: IntoIterator<Item = &'a ResultRow>>(rows: I) -> i64 {
    rows.into_iter()
        .filter(|r| !r.confirmed)
        .map(|r| r.projected_nps)
        .sum()
}

/// Per-quarter aggregation of a row subset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QuarterRollup {
    /// NPs summed over every row in the quarter.
    pub nps: i64,
    /// Projected NPs over unconfirmed rows.
    pub projected: i64,
    /// Investment over confirmed rows.
    pub confirmed_investment: i64,
    /// NPs over confirmed rows.
    pub confirmed_nps: i64,
}

impl QuarterRollup {
    /// CAC against the quarter's own confirmed NPs ("acciones").
    pub fn cac_acciones(&self) -> Decimal {
        cac_usd(self.confirmed_investment, self.confirmed_nps)
    }

    /// CAC against an externally displayed NPs figure ("general").
    pub fn cac_general(&self, display_nps: i64) -> Decimal {
        cac_usd(self.confirmed_investment, display_nps)
    }
}

/// Rollups for the four quarters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QuarterRollups([QuarterRollup; 4]);

impl QuarterRollups {
    pub fn get(&self, q: Quarter) -> &QuarterRollup {
        &self.0[q as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quarter, &QuarterRollup)> + '_ {
        Quarter::ALL.iter().copied().zip(self.0.iter())
    }
}

/// Group rows by the quarter of their date; rows with no date are skipped.
pub fn rollup_by_quarter<'a, I: IntoIterator<Item = &'a ResultRow>>(rows: I) -> QuarterRollups {
    let mut out = QuarterRollups::default();
    for row in rows {
        let Some(date) = row.date else { continue };
        let slot = &mut out.0[Quarter::of(date) as usize];
        slot.nps += row.nps;
        if row.confirmed {
            slot.confirmed_investment += total_investment(row);
            slot.confirmed_nps += row.nps;
        } else {
            slot.projected += row.projected_nps;
        }
    }
    out
}

/// Per-lever NPs and row counts for the lever cards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LeverStats {
    pub nps: i64,
    pub rows: usize,
}

/// Group rows by the lever their name resolves to; unresolved names are
/// left out.
pub fn rollup_by_lever<'a, I: IntoIterator<Item = &'a ResultRow>>(
    rows: I,
    categories: &CategorySet,
) -> BTreeMap<LeverKey, LeverStats> {
    let mut out: BTreeMap<LeverKey, LeverStats> =
        LeverKey::ALL.into_iter().map(|k| (k, LeverStats::default())).collect();
    for row in rows {
        if let Some(lever) = categories.resolve_lever(&row.name) {
            let stats = out.entry(lever).or_default();
            stats.nps += row.nps;
            stats.rows += 1;
        }
    }
    out
}

/// Outcome of an actual-vs-target comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TargetStatus {
    /// Target met or exceeded.
    Met,
    /// Short by this many NPs.
    Missing(i64),
}

/// Delta of a figure against its quarterly target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TargetDelta {
    pub delta: i64,
    pub status: TargetStatus,
}

/// Compare an achieved figure against the manual target. Used both for the
/// realized actual and for the forward-looking actual + projection.
pub fn target_delta(achieved: i64, target: i64) -> TargetDelta {
    let delta = achieved - target;
    let status = if delta < 0 {
        TargetStatus::Missing(-delta)
    } else {
        TargetStatus::Met
    };
    TargetDelta { delta, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn row(id: i64) -> ResultRow {
        ResultRow::blank(id)
    }

    fn dated(id: i64, date: &str) -> ResultRow {
        let mut r = row(id);
        r.date = Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
        r
    }

    #[test]
    fn scenario_row_derivation() {
        let mut r = row(1);
        r.wa_group = 100;
        r.attendees = 40;
        r.trials = 20;
        r.nps = 5;
        r.fixed = 100_000;
        r.variable = 50_000;
        r.pauta = 25_000;
        r.has_commission = true;

        let m = RowMetrics::of(&r);
        assert_eq!(m.attendance_rate, Decimal::new(400, 1)); // 40.0%
        assert_eq!(m.trial_rate, Decimal::new(200, 1)); // 20.0%
        assert_eq!(m.nps_conversion, Decimal::new(250, 1)); // 25.0%
        assert_eq!(m.commission, 217_875);
        assert_eq!(m.total_investment, 392_875);
        assert_eq!(m.cac_local, 78_575);
        // 78575 / 3700 = 21.2365 to four decimals.
        assert_eq!(m.cac_hard.round_dp(2), Decimal::new(2124, 2));
    }

    #[test]
    fn zero_divisors_produce_zero_not_errors() {
        let mut r = row(1);
        r.nps = 0;
        r.trials = 0;
        r.wa_group = 0;
        r.fixed = 500_000;
        let m = RowMetrics::of(&r);
        assert_eq!(m.attendance_rate, Decimal::ZERO);
        assert_eq!(m.trial_rate, Decimal::ZERO);
        assert_eq!(m.nps_conversion, Decimal::ZERO);
        assert_eq!(m.cac_local, 0);
        assert_eq!(m.cac_hard, Decimal::ZERO);
        assert_eq!(cac_usd(0, 0), Decimal::ZERO);
    }

    #[test]
    fn commission_off_zeroes_the_component_only() {
        let mut r = row(1);
        r.nps = 4;
        r.fixed = 10_000;
        r.has_commission = false;
        let m = RowMetrics::of(&r);
        assert_eq!(m.commission, 0);
        assert_eq!(m.total_investment, 10_000);
    }

    #[test]
    fn delta_trend_directions() {
        let mut r = row(1);
        r.nps = 5;
        r.projected_nps = 3;
        assert_eq!(RowMetrics::of(&r).trend, Trend::Up);
        r.projected_nps = 9;
        assert_eq!(RowMetrics::of(&r).trend, Trend::Down);
        r.projected_nps = 5;
        assert_eq!(RowMetrics::of(&r).trend, Trend::Flat);
        r.nps = 0;
        r.projected_nps = 0;
        assert_eq!(RowMetrics::of(&r).trend, Trend::Flat);
    }

    #[test]
    fn subset_cac_is_ratio_of_sums_not_mean() {
        // Two confirmed rows with very different efficiency.
        let mut a = row(1);
        a.confirmed = true;
        a.nps = 1;
        a.fixed = 370_000;
        a.has_commission = false;
        let mut b = row(2);
        b.confirmed = true;
        b.nps = 9;
        b.fixed = 370_000;
        b.has_commission = false;

        let rows = [a.clone(), b.clone()];
        let inv = confirmed_investment(&rows);
        let nps = confirmed_nps(&rows);
        assert_eq!(inv, 740_000);
        assert_eq!(nps, 10);
        // ratio of sums: 740000 / 10 / 3700 = 20
        assert_eq!(cac_usd(inv, nps), Decimal::from(20));
        // mean of row CACs would be (100 + 11.11..) / 2 ≈ 55.6 — not this.
        let mean = (RowMetrics::of(&a).cac_hard + RowMetrics::of(&b).cac_hard) / Decimal::from(2);
        assert_ne!(cac_usd(inv, nps).round_dp(2), mean.round_dp(2));
    }

    #[test]
    fn unconfirmed_rows_are_invisible_to_cac_but_drive_projection() {
        let mut pending = row(1);
        pending.nps = 3;
        pending.projected_nps = 7;
        pending.fixed = 1_000_000;
        let mut done = row(2);
        done.confirmed = true;
        done.nps = 2;
        done.projected_nps = 5;
        done.fixed = 100_000;
        done.has_commission = false;

        let rows = [pending, done];
        assert_eq!(confirmed_investment(&rows), 100_000);
        assert_eq!(confirmed_nps(&rows), 2);
        // Confirmed rows leave the projection sum.
        assert_eq!(projected_sum(&rows), 7);
        assert_eq!(nps_sum(&rows), 5);
    }

    #[test]
    fn quarter_rollup_groups_by_date_and_skips_dateless() {
        let mut q1 = dated(1, "2026-02-10");
        q1.nps = 3;
        q1.confirmed = true;
        q1.fixed = 37_000;
        q1.has_commission = false;
        let mut q3 = dated(2, "2026-08-01");
        q3.projected_nps = 6;
        let mut dateless = row(3);
        dateless.nps = 99;

        let rollups = rollup_by_quarter([&q1, &q3, &dateless]);
        assert_eq!(rollups.get(Quarter::Q1).nps, 3);
        assert_eq!(rollups.get(Quarter::Q1).confirmed_nps, 3);
        assert_eq!(rollups.get(Quarter::Q1).confirmed_investment, 37_000);
        assert_eq!(rollups.get(Quarter::Q3).projected, 6);
        assert_eq!(rollups.get(Quarter::Q3).nps, 0);
        // Dateless rows appear in no quarter.
        let total: i64 = rollups.iter().map(|(_, r)| r.nps).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn empty_quarter_cac_is_zero() {
        let rollups = rollup_by_quarter(std::iter::empty::<&ResultRow>());
        let q3 = rollups.get(Quarter::Q3);
        assert_eq!(q3.cac_acciones(), Decimal::ZERO);
        assert_eq!(q3.cac_general(0), Decimal::ZERO);
    }

    #[test]
    fn lever_rollup_resolves_names() {
        let mut cats = CategorySet::default();
        cats.set_members(LeverKey::Comunidad, ["Orange"]);
        cats.set_members(LeverKey::Alianza, ["Bold"]);

        let mut a = row(1);
        a.name = "Orange".into();
        a.nps = 4;
        let mut b = row(2);
        b.name = "Bold".into();
        b.nps = 2;
        let mut unknown = row(3);
        unknown.name = "Nadie".into();
        unknown.nps = 50;

        let stats = rollup_by_lever([&a, &b, &unknown], &cats);
        assert_eq!(stats[&LeverKey::Comunidad].nps, 4);
        assert_eq!(stats[&LeverKey::Comunidad].rows, 1);
        assert_eq!(stats[&LeverKey::Alianza].nps, 2);
        assert_eq!(stats[&LeverKey::Tradicional].rows, 0);
    }

    #[test]
    fn target_delta_scenario() {
        // Q2: target 50, actual 30, unconfirmed projection 15.
        let actual = target_delta(30, 50);
        assert_eq!(actual.delta, -20);
        assert_eq!(actual.status, TargetStatus::Missing(20));

        let forecast = target_delta(30 + 15, 50);
        assert_eq!(forecast.delta, -5);
        assert_eq!(forecast.status, TargetStatus::Missing(5));

        assert_eq!(target_delta(50, 50).status, TargetStatus::Met);
        assert_eq!(target_delta(60, 50).status, TargetStatus::Met);
    }

    proptest! {
        #[test]
        fn investment_identity(fixed in 0i64..10_000_000, variable in 0i64..10_000_000,
                               pauta in 0i64..10_000_000, nps in 0i64..10_000,
                               has_commission in any::<bool>()) {
            let mut r = ResultRow::blank(1);
            r.fixed = fixed;
            r.variable = variable;
            r.pauta = pauta;
            r.nps = nps;
            r.has_commission = has_commission;
            let m = RowMetrics::of(&r);
            let expected_commission = if has_commission { COMMISSION_PER_NP * nps } else { 0 };
            prop_assert_eq!(m.commission, expected_commission);
            prop_assert_eq!(m.total_investment, fixed + variable + expected_commission + pauta);
        }

        #[test]
        fn cac_local_divides_total_by_nps(total in 1i64..100_000_000, nps in 1i64..10_000) {
            let mut r = ResultRow::blank(1);
            r.fixed = total;
            r.nps = nps;
            r.has_commission = false;
            let m = RowMetrics::of(&r);
            // Rounded quotient never drifts more than half a unit.
            let back = m.cac_local * nps;
            prop_assert!((back - total).abs() <= nps / 2 + 1);
        }
    }
}
