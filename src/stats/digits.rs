//! Last-digit frequency statistics over a rolling tick window.
//!
//! The volatility labels are presentation heuristics with fixed thresholds,
//! not statistical signals.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;

use crate::config::MAX_DIGIT_WINDOW;

/// Std-dev thresholds (percentage points) for Low / Medium.
const STD_DEV_THRESHOLDS: (f64, f64) = (1.5, 3.0);
/// Max-min range thresholds (percentage points) for Low / Medium.
const RANGE_THRESHOLDS: (f64, f64) = (5.0, 10.0);
/// Even/odd gap thresholds (percentage points) for Low / Medium.
const EVEN_ODD_THRESHOLDS: (f64, f64) = (5.0, 10.0);

/// Final decimal digit of a quote.
///
/// With `pip_size`, the quote is rendered at that many decimals first so
/// trailing zeros count (`123.4` at pip size 2 is `123.40`, digit `0`).
/// Without it the quote's own scale is used.
pub fn last_digit(quote: Decimal, pip_size: Option<u32>) -> u8 {
    let mut q = quote;
    if let Some(pips) = pip_size {
        q = q.round_dp(pips);
        q.rescale(pips);
    }
    (q.mantissa() % 10).unsigned_abs() as u8
}

/// Heuristic volatility label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Volatility {
    /// Below the first threshold.
    Low,
    /// Between the thresholds.
    Medium,
    /// At or above the second threshold.
    High,
}

impl Volatility {
    fn classify(value: f64, (low, medium): (f64, f64)) -> Self {
        if value < low {
            Volatility::Low
        } else if value < medium {
            Volatility::Medium
        } else {
            Volatility::High
        }
    }
}

/// The three volatility labels shown next to the digit chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilityReport {
    /// From the std deviation of per-digit percentages.
    pub distribution: Volatility,
    /// From the max-min range of per-digit percentages.
    pub range: Volatility,
    /// From the even/odd percentage gap.
    pub even_odd: Volatility,
}

/// Digit frequency statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitStats {
    /// Digits counted.
    pub sample_size: usize,
    /// Occurrences per digit.
    pub counts: [usize; 10],
    /// Occurrence percentage per digit.
    pub percentages: [f64; 10],
    /// Percentage of even digits.
    pub even_pct: f64,
    /// Percentage of odd digits.
    pub odd_pct: f64,
    /// Population std deviation of the per-digit percentages.
    pub std_dev: f64,
    /// Max minus min per-digit percentage.
    pub range: f64,
    /// Absolute even/odd percentage gap.
    pub even_odd_gap: f64,
    /// Most frequent digit (lowest on ties).
    pub most_frequent: Option<u8>,
    /// Least frequent digit (lowest on ties).
    pub least_frequent: Option<u8>,
    /// Volatility labels.
    pub volatility: VolatilityReport,
}

impl DigitStats {
    /// Compute statistics over a slice of digits. Values above 9 are skipped.
    pub fn compute(digits: &[u8]) -> Self {
        let mut counts = [0usize; 10];
        for &d in digits {
            if let Some(slot) = counts.get_mut(usize::from(d)) {
                *slot += 1;
            }
        }
        let sample_size: usize = counts.iter().sum();

        let mut percentages = [0.0f64; 10];
        if sample_size > 0 {
            for (pct, &count) in percentages.iter_mut().zip(counts.iter()) {
                *pct = count as f64 * 100.0 / sample_size as f64;
            }
        }

        let even_pct: f64 = percentages.iter().step_by(2).sum();
        let odd_pct: f64 = percentages.iter().skip(1).step_by(2).sum();

        let (std_dev, range, most_frequent, least_frequent) = if sample_size == 0 {
            (0.0, 0.0, None, None)
        } else {
            let mean = percentages.iter().sum::<f64>() / 10.0;
            let variance = percentages.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / 10.0;

            let mut max_i = 0;
            let mut min_i = 0;
            for i in 1..10 {
                if counts[i] > counts[max_i] {
                    max_i = i;
                }
                if counts[i] < counts[min_i] {
                    min_i = i;
                }
            }

            (
                variance.sqrt(),
                percentages[max_i] - percentages[min_i],
                Some(max_i as u8),
                Some(min_i as u8),
            )
        };

        let even_odd_gap = (even_pct - odd_pct).abs();

        Self {
            sample_size,
            counts,
            percentages,
            even_pct,
            odd_pct,
            std_dev,
            range,
            even_odd_gap,
            most_frequent,
            least_frequent,
            volatility: VolatilityReport {
                distribution: Volatility::classify(std_dev, STD_DEV_THRESHOLDS),
                range: Volatility::classify(range, RANGE_THRESHOLDS),
                even_odd: Volatility::classify(even_odd_gap, EVEN_ODD_THRESHOLDS),
            },
        }
    }
}

/// Rolling window of the most recent last digits.
#[derive(Debug, Clone)]
pub struct DigitWindow {
    digits: VecDeque<u8>,
    capacity: usize,
}

impl DigitWindow {
    /// Create a window. Capacity is clamped to `1..=1000`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_DIGIT_WINDOW);
        Self {
            digits: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a digit, evicting the oldest when full. Values above 9 are ignored.
    pub fn push(&mut self, digit: u8) {
        if digit > 9 {
            return;
        }
        if self.digits.len() == self.capacity {
            self.digits.pop_front();
        }
        self.digits.push_back(digit);
    }

    /// Push the last digit of a quote, returning it.
    pub fn push_quote(&mut self, quote: Decimal, pip_size: Option<u32>) -> u8 {
        let digit = last_digit(quote, pip_size);
        self.push(digit);
        digit
    }

    /// Digits held, oldest first.
    pub fn digits(&self) -> Vec<u8> {
        self.digits.iter().copied().collect()
    }

    /// Most recent digit.
    pub fn latest(&self) -> Option<u8> {
        self.digits.back().copied()
    }

    /// Number of digits held.
    pub fn len(&self) -> usize {
        self.digits.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    /// Maximum digits held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all digits.
    pub fn clear(&mut self) {
        self.digits.clear();
    }

    /// Statistics over the current window.
    pub fn stats(&self) -> DigitStats {
        let (a, b) = self.digits.as_slices();
        if b.is_empty() {
            DigitStats::compute(a)
        } else {
            DigitStats::compute(&self.digits())
        }
    }
}

impl Default for DigitWindow {
    fn default() -> Self {
        Self::new(MAX_DIGIT_WINDOW)
    }
}
