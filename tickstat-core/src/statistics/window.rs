//! Window rules selecting which source bars are in scope for a query.
//!
//! Every window is a contiguous range of source bars ending no later than
//! the target bar. Each query is correct on its own; the cursor only speeds
//! up callers that move forward.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};
use crate::histogram::TradeHistogramAggregator;
use crate::source::BarSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrameUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeFrameUnit {
    /// `None` when `count` units do not fit in a [`TimeDelta`].
    fn span(self, count: u32) -> Option<TimeDelta> {
        let count = i64::from(count);
        match self {
            Self::Second => TimeDelta::try_seconds(count),
            Self::Minute => TimeDelta::try_minutes(count),
            Self::Hour => TimeDelta::try_hours(count),
            Self::Day => TimeDelta::try_days(count),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
            Self::Day => "d",
        }
    }
}

/// Where a time window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrameKind {
    /// Start of the calendar day of the window's end.
    FromMidnightToNow,
    /// Fixed trailing span ending at the window's end.
    #[default]
    RollingSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowSpec {
    /// Every bar from session start through the target.
    AllTime,
    /// Newest bars whose combined quantity reaches `contracts`.
    LastContracts { contracts: f64 },
    /// Bars with timestamps in `[end - span, end]`, `end = target time + shift`.
    TimeFrame {
        unit: TimeFrameUnit,
        count: u32,
        #[serde(default)]
        kind: TimeFrameKind,
        #[serde(default)]
        shift_seconds: i64,
    },
}

impl WindowSpec {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::AllTime => Ok(()),
            Self::LastContracts { contracts } => {
                if contracts.is_finite() && contracts > 0.0 {
                    Ok(())
                } else {
                    Err(StatError::invalid(format!(
                        "contract count must be positive, got {contracts}"
                    )))
                }
            }
            Self::TimeFrame {
                unit,
                count,
                shift_seconds,
                ..
            } => {
                if count == 0 {
                    return Err(StatError::invalid("time frame count must be >= 1"));
                }
                if unit.span(count).is_none() {
                    return Err(StatError::invalid(format!(
                        "time frame of {count}{} is out of range",
                        unit.suffix()
                    )));
                }
                if TimeDelta::try_seconds(shift_seconds).is_none() {
                    return Err(StatError::invalid(format!(
                        "shift of {shift_seconds}s is out of range"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllTime => write!(f, "all"),
            Self::LastContracts { contracts } => write!(f, "last_contracts={contracts}"),
            Self::TimeFrame {
                unit,
                count,
                kind,
                shift_seconds,
            } => {
                let kind = match kind {
                    TimeFrameKind::FromMidnightToNow => "midnight",
                    TimeFrameKind::RollingSpan => "rolling",
                };
                write!(
                    f,
                    "time={count}{},{kind},shift={shift_seconds}s",
                    unit.suffix()
                )
            }
        }
    }
}

/// Start of the last time window, reused while targets move forward.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    target: usize,
    start: usize,
}

#[derive(Debug, Clone)]
pub struct StatisticsWindow {
    spec: WindowSpec,
    cursor: Option<Cursor>,
}

impl StatisticsWindow {
    pub fn new(spec: WindowSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec, cursor: None })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Source bars in scope at `target`, or `None` when the window is empty.
    ///
    /// `histograms` must be aggregated through `target`.
    pub fn select<B: BarSource + ?Sized>(
        &mut self,
        histograms: &TradeHistogramAggregator,
        source: &B,
        target: usize,
    ) -> Result<Option<RangeInclusive<usize>>> {
        if target >= histograms.aggregated_len() {
            return Err(StatError::OutOfRange {
                what: "aggregated bar",
                index: target,
                len: histograms.aggregated_len(),
            });
        }
        match self.spec {
            WindowSpec::AllTime => Ok(Some(0..=target)),
            WindowSpec::LastContracts { contracts } => {
                last_contracts(histograms, target, contracts).map(Some)
            }
            WindowSpec::TimeFrame {
                unit,
                count,
                kind,
                shift_seconds,
            } => {
                let out_of_range = || {
                    StatError::invalid(format!(
                        "{} window at bar {target} falls outside the calendar",
                        self.spec
                    ))
                };
                let end_time = TimeDelta::try_seconds(shift_seconds)
                    .and_then(|shift| source.timestamp(target).checked_add_signed(shift))
                    .ok_or_else(out_of_range)?;
                let start_time = match kind {
                    TimeFrameKind::RollingSpan => unit
                        .span(count)
                        .and_then(|span| end_time.checked_sub_signed(span))
                        .ok_or_else(out_of_range)?,
                    TimeFrameKind::FromMidnightToNow => {
                        NaiveDateTime::new(end_time.date(), NaiveTime::MIN)
                    }
                };
                Ok(self.time_range(source, target, start_time, end_time))
            }
        }
    }

    fn time_range<B: BarSource + ?Sized>(
        &mut self,
        source: &B,
        target: usize,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Option<RangeInclusive<usize>> {
        // Last bar not after the window end; never past the target.
        let mut end = target;
        while source.timestamp(end) > end_time {
            if end == 0 {
                return None;
            }
            end -= 1;
        }

        let hint = match self.cursor {
            Some(c) if c.target <= target => c.start,
            _ => 0,
        };
        let start = first_at_or_after(source, hint.min(end), end, start_time);
        self.cursor = Some(Cursor { target, start });

        (start <= end).then_some(start..=end)
    }
}

/// Walk back from `target` until at least `contracts` have traded.
///
/// Whole bars are taken, so the range holds at least `contracts` unless the
/// session is too short, in which case every bar is in scope.
fn last_contracts(
    histograms: &TradeHistogramAggregator,
    target: usize,
    contracts: f64,
) -> Result<RangeInclusive<usize>> {
    let mut total = 0.0;
    let mut index = target;
    loop {
        total += histograms.bar_quantity(index)?;
        if total >= contracts || index == 0 {
            return Ok(index..=target);
        }
        index -= 1;
    }
}

/// First index in `lo..=hi` whose timestamp is `>= time`, or `hi + 1`.
fn first_at_or_after<B: BarSource + ?Sized>(
    source: &B,
    lo: usize,
    hi: usize,
    time: NaiveDateTime,
) -> usize {
    let (mut lo, mut hi) = (lo, hi + 1);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if source.timestamp(mid) < time {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
