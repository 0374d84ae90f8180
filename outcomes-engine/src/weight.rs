//! Edge weights and the asymmetric normalization policy
//!
//! Relation weights arrive either as percentages (`40`) or as fractions
//! (`0.4`), sometimes as text or NULL. [`Weight`] absorbs all of that at the
//! boundary so the aggregators only ever see a non-negative fraction.
//!
//! Totals are never scaled *up*: a target fed by less than 100% of weight
//! keeps a proportionally smaller score. Totals above 100% are scaled *down*
//! so contributions cannot double count.

use std::collections::BTreeMap;

/// Percentage scale used for coverage and denominators
pub const FULL_PERCENT: f64 = 100.0;

/// A non-negative edge weight, stored as a fraction of 1
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Weight(f64);

impl Weight {
    pub const ZERO: Weight = Weight(0.0);

    /// Normalize a raw stored value
    ///
    /// Values greater than 1 are percentages and are divided by 100.
    /// Values in `0..=1` are already fractions. Negative and non-finite
    /// values coerce to zero.
    pub fn from_raw(raw: f64) -> Self {
        if !raw.is_finite() || raw <= 0.0 {
            Weight::ZERO
        } else if raw > 1.0 {
            Weight(raw / FULL_PERCENT)
        } else {
            Weight(raw)
        }
    }

    /// Normalize a raw textual value; missing or unparseable is zero
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<f64>().ok())
            .map(Weight::from_raw)
            .unwrap_or(Weight::ZERO)
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    pub fn percent(self) -> f64 {
        self.0 * FULL_PERCENT
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

/// Divisor that brings a weighted sum back to the 0-100 scale
///
/// Totals at or below 100 use 100 (no inflation); totals above 100 use
/// the total itself. Non-finite totals are treated as 0.
pub fn safe_denominator(total: f64) -> f64 {
    if !total.is_finite() || total <= FULL_PERCENT {
        FULL_PERCENT
    } else {
        total
    }
}

/// Round to two decimal places for reporting
///
/// Rounds the exact binary value with ties to even, so `40.125` becomes
/// `40.12` and `2.675` (stored just below the tie) becomes `2.67`.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.2}", value).parse().unwrap_or(value)
}

/// Folded value of one target node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Folded {
    /// Weighted score after the >100% rescale
    pub score: f64,
    /// Sum of incoming weights, as a percentage
    pub coverage: f64,
}

/// Accumulates `value * weight` per target and applies the rescale policy
///
/// Keys are ordered so summation order, and therefore the floating point
/// result, is identical across runs.
#[derive(Debug, Clone)]
pub struct WeightedFold<K: Ord> {
    entries: BTreeMap<K, (f64, f64)>,
}

impl<K: Ord> Default for WeightedFold<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> WeightedFold<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one weighted contribution towards `target`
    pub fn add(&mut self, target: K, value: f64, weight: Weight) {
        let entry = self.entries.entry(target).or_insert((0.0, 0.0));
        entry.0 += value * weight.fraction();
        entry.1 += weight.percent();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finish the fold
    ///
    /// Targets whose total incoming weight is zero are dropped. Targets
    /// above 100% are divided by `total / 100`; the rest are left as-is.
    pub fn finish(self) -> BTreeMap<K, Folded> {
        self.entries
            .into_iter()
            .filter(|(_, (_, total))| *total > 0.0)
            .map(|(target, (score, total))| {
                let score = score * FULL_PERCENT / safe_denominator(total);
                (
                    target,
                    Folded {
                        score,
                        coverage: total,
                    },
                )
            })
            .collect()
    }
}
