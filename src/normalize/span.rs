//! Per-span correction arithmetic.
//!
//! Each step of the correction is its own function so the scan in
//! [`correct_spans`] reads as the formula it implements:
//!
//! ```text
//! counter_delta    = counter[i] - counter[i-1]
//! span_duration_us = running[i] - running[i-1]
//! enabled_delta    = enabled[i] - enabled[i-1]
//! sampling_scaling = span_duration_us / enabled_delta
//! corrected_value  = counter_delta * sampling_scaling
//! ```
//!
//! Row `-1` is a synthetic all-zero reading.

/// Cumulative value of the counter being normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterReading {
    Int(i64),
    Float(f64),
}

impl CounterReading {
    /// Difference to `prev`. Integer counters are differenced before widening.
    pub fn delta(self, prev: Self) -> f64 {
        match (self, prev) {
            (Self::Int(cur), Self::Int(prev)) => cur.saturating_sub(prev) as f64,
            (cur, prev) => cur.as_f64() - prev.as_f64(),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// Cumulative readings carried by one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub counter: CounterReading,
    pub enabled_us: i64,
    pub running_us: i64,
}

impl Reading {
    /// The synthetic predecessor of the first sample on a CPU.
    pub const ZERO: Self = Self {
        counter: CounterReading::Int(0),
        enabled_us: 0,
        running_us: 0,
    };
}

/// Corrected result for one sample span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedSpan {
    pub span_duration_us: i64,
    /// `None` when the enabled window did not advance over the span, or the
    /// corrected value is not finite.
    pub value: Option<f64>,
}

impl CorrectedSpan {
    pub fn is_degenerate(&self) -> bool {
        self.value.is_none()
    }
}

/// Pairs every reading with its predecessor, starting from [`Reading::ZERO`].
pub fn shifted(readings: &[Reading]) -> impl Iterator<Item = (Reading, Reading)> + '_ {
    std::iter::once(Reading::ZERO)
        .chain(readings.iter().copied())
        .zip(readings.iter().copied())
}

pub fn counter_delta(prev: Reading, cur: Reading) -> f64 {
    cur.counter.delta(prev.counter)
}

pub fn span_duration_us(prev: Reading, cur: Reading) -> i64 {
    cur.running_us.saturating_sub(prev.running_us)
}

pub fn enabled_delta_us(prev: Reading, cur: Reading) -> i64 {
    cur.enabled_us.saturating_sub(prev.enabled_us)
}

/// Fraction of the enabled window the counter was actually running.
///
/// Returns `None` for a degenerate window (`enabled_delta_us == 0`).
pub fn sampling_scaling(span_duration_us: i64, enabled_delta_us: i64) -> Option<f64> {
    if enabled_delta_us == 0 {
        return None;
    }
    Some(span_duration_us as f64 / enabled_delta_us as f64)
}

pub fn corrected_value(counter_delta: f64, sampling_scaling: f64) -> f64 {
    counter_delta * sampling_scaling
}

/// Corrects every span of one CPU's readings, already in timestamp order.
pub fn correct_spans(readings: &[Reading]) -> Vec<CorrectedSpan> {
    shifted(readings)
        .map(|(prev, cur)| {
            let span = span_duration_us(prev, cur);
            let value = sampling_scaling(span, enabled_delta_us(prev, cur))
                .map(|scaling| corrected_value(counter_delta(prev, cur), scaling))
                .filter(|v| v.is_finite());
            CorrectedSpan {
                span_duration_us: span,
                value,
            }
        })
        .collect()
}

/// Running total of corrected values.
///
/// A degenerate span stays `None` and adds nothing to the total seen by
/// later spans.
pub fn prefix_sum(spans: &[CorrectedSpan]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    spans
        .iter()
        .map(|span| {
            let value = span.value?;
            total += value;
            Some(total)
        })
        .collect()
}
