//! Statistics over repeated runs
//!
//! [`OrderStat`] is the generic order-statistic extractor used for every
//! sample set: stage work and wait times, per-run load peaks, first arrivals
//! and last departures. It sorts once and then answers min/max/median and
//! the low/high quantile pair for a level `L` in (0, 1].
//!
//! Empty samples and out-of-range levels yield `V::default()`, since unused
//! stages are a normal occurrence.

use std::ops::Add;

use crate::cp_interface::{CpDuration, CpTime, StageId, StageOutcome, TeamId};

// absorbs binary rounding in n * (1 - L) before flooring, e.g. 10 * (1 - 0.9)
const STEP_EPSILON: f64 = 1e-9;

// ============================================================================
// Order statistics
// ============================================================================

/// Sorted sample supporting order-statistic queries
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStat<V> {
    sorted: Vec<V>,
}

impl<V: Clone + Default> OrderStat<V> {
    /// Sort `items` by `key` once and keep the `value` of each element.
    ///
    /// The sort is stable, so elements with equal keys keep their input order.
    pub fn new<T, K, I, FV, FK>(items: I, value: FV, key: FK) -> Self
    where
        I: IntoIterator<Item = T>,
        K: Ord,
        FV: Fn(&T) -> V,
        FK: Fn(&T) -> K,
    {
        let mut keyed: Vec<(K, V)> = items
            .into_iter()
            .map(|item| (key(&item), value(&item)))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            sorted: keyed.into_iter().map(|(_, v)| v).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn min(&self) -> V {
        self.sorted.first().cloned().unwrap_or_default()
    }

    pub fn max(&self) -> V {
        self.sorted.last().cloned().unwrap_or_default()
    }

    /// Lower median
    pub fn median(&self) -> V {
        if self.sorted.is_empty() {
            return V::default();
        }
        self.sorted[(self.sorted.len() - 1) / 2].clone()
    }

    /// Low quantile: `sorted[floor(n * (1 - L))]`
    pub fn low(&self, level: f64) -> V {
        match self.step(level) {
            Some(step) => self.sorted[step].clone(),
            None => V::default(),
        }
    }

    /// High quantile, symmetric to [`OrderStat::low`] from the other tail
    pub fn high(&self, level: f64) -> V {
        match self.step(level) {
            Some(step) => self.sorted[self.sorted.len() - 1 - step].clone(),
            None => V::default(),
        }
    }

    /// Both quantile bounds for one level
    pub fn bounds(&self, level: f64) -> (V, V) {
        (self.low(level), self.high(level))
    }

    /// Offset from either tail for a level. Levels below one half would cross
    /// the tails over, so the offset never passes the median.
    fn step(&self, level: f64) -> Option<usize> {
        if self.sorted.is_empty() || !(level > 0.0 && level <= 1.0) {
            return None;
        }
        let n = self.sorted.len();
        let step = (n as f64 * (1.0 - level) + STEP_EPSILON).floor() as usize;
        Some(step.min((n - 1) / 2))
    }
}

impl<V: Clone + Default + Ord> OrderStat<V> {
    /// Order plain values by themselves
    pub fn from_values<I: IntoIterator<Item = V>>(values: I) -> Self {
        let mut sorted: Vec<V> = values.into_iter().collect();
        sorted.sort();
        Self { sorted }
    }
}

// ============================================================================
// Time samples
// ============================================================================

/// Five-number summary of a time sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSummary {
    pub min: CpDuration,
    pub low: CpDuration,
    pub high: CpDuration,
    pub max: CpDuration,
    pub mean: CpDuration,
}

/// Accumulating sample of durations
#[derive(Debug, Clone, Default)]
pub struct TimeStat {
    total: CpDuration,
    all: Vec<CpDuration>,
}

impl TimeStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, span: CpDuration) {
        self.total += span;
        self.all.push(span);
    }

    pub fn num(&self) -> usize {
        self.all.len()
    }

    pub fn total(&self) -> CpDuration {
        self.total
    }

    pub fn min(&self) -> CpDuration {
        self.all.iter().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> CpDuration {
        self.all.iter().copied().max().unwrap_or(0)
    }

    /// Mean truncated to whole minutes
    pub fn mean(&self) -> CpDuration {
        if self.all.is_empty() {
            return 0;
        }
        self.total / self.all.len() as CpDuration
    }

    pub fn order(&self) -> OrderStat<CpDuration> {
        OrderStat::from_values(self.all.iter().copied())
    }

    pub fn summary(&self, level: f64) -> TimeSummary {
        if self.all.is_empty() {
            return TimeSummary::default();
        }
        let (low, high) = self.order().bounds(level);
        TimeSummary {
            min: self.min(),
            low,
            high,
            max: self.max(),
            mean: self.mean(),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Entry in a stage's long-run log: one team passing the stage once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTeamRecord {
    pub team: TeamId,
    pub outcome: StageOutcome,
    /// Start time at a Start stage, arrival time elsewhere
    pub when: CpTime,
}

/// Entry in a team's history: one stage passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamStageRecord {
    pub stage: StageId,
    pub stage_name: String,
    pub outcome: StageOutcome,
}

/// Per-run summary of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageRunSummary {
    /// Maximum simultaneous in-service plus waiting teams
    pub max_load: usize,
    pub first_arrival: CpTime,
    pub last_departure: CpTime,
}

// ============================================================================
// Stage statistics
// ============================================================================

/// Aggregated statistics of one stage over all runs so far
#[derive(Debug, Clone)]
pub struct PhaseStat {
    pub teams: usize,
    pub rejects: usize,
    pub work: TimeStat,
    /// Only visits that actually waited
    pub wait: TimeStat,
    pub runs: Vec<StageRunSummary>,
}

/// One row of the aggregate stage table
#[derive(Debug, Clone, PartialEq)]
pub struct StageReportRow {
    pub teams_per_run: f64,
    pub max_load: usize,
    pub max_load_high: usize,
    pub busy_from: CpTime,
    pub busy_from_low: CpTime,
    pub busy_to_high: CpTime,
    pub busy_to: CpTime,
    pub work: TimeSummary,
    pub waits_per_run: f64,
    pub wait: TimeSummary,
    pub rejects_per_run: f64,
    /// Rejection limit of the stage (0 = none)
    pub limit: CpDuration,
}

impl PhaseStat {
    pub fn new(records: &[StageTeamRecord], runs: &[StageRunSummary]) -> Self {
        let mut stat = Self {
            teams: 0,
            rejects: 0,
            work: TimeStat::new(),
            wait: TimeStat::new(),
            runs: runs.to_vec(),
        };

        for record in records {
            stat.teams += 1;
            stat.work.add(record.outcome.work);
            if record.outcome.wait != 0 {
                stat.wait.add(record.outcome.wait);
            }
            if record.outcome.rejected {
                stat.rejects += 1;
            }
        }

        stat
    }

    pub fn load(&self) -> OrderStat<usize> {
        OrderStat::from_values(self.runs.iter().map(|r| r.max_load))
    }

    pub fn first_arrivals(&self) -> OrderStat<CpTime> {
        OrderStat::new(self.runs.iter(), |r| r.first_arrival, |r| r.first_arrival)
    }

    pub fn last_departures(&self) -> OrderStat<CpTime> {
        OrderStat::new(self.runs.iter(), |r| r.last_departure, |r| r.last_departure)
    }

    /// Build the aggregate row, normalising counts by the number of runs
    pub fn row(&self, runs: usize, level: f64, limit: CpDuration) -> StageReportRow {
        let load = self.load();
        let start = self.first_arrivals();
        let end = self.last_departures();

        StageReportRow {
            teams_per_run: per_run(self.teams, runs),
            max_load: load.max(),
            max_load_high: load.high(level),
            busy_from: start.min(),
            busy_from_low: start.low(level),
            busy_to_high: end.high(level),
            busy_to: end.max(),
            work: self.work.summary(level),
            waits_per_run: per_run(self.wait.num(), runs),
            wait: self.wait.summary(level),
            rejects_per_run: per_run(self.rejects, runs),
            limit,
        }
    }
}

/// Count per run rounded to two decimals
fn per_run(count: usize, runs: usize) -> f64 {
    if runs == 0 {
        return 0.0;
    }
    (count as f64 / runs as f64 * 100.0).round() / 100.0
}

// ============================================================================
// Team statistics
// ============================================================================

/// Aggregate of a team's stage outcomes over one day, or several days combined
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TeamStat {
    pub start: CpTime,
    pub work: CpDuration,
    pub wait: CpDuration,
    /// Pre- and post-service overheads
    pub overhead: CpDuration,
    pub rejects: usize,
    pub waits: usize,
    pub rejected_at: Vec<String>,
    pub waited_at: Vec<String>,
}

impl TeamStat {
    pub fn from_records(start: CpTime, records: &[TeamStageRecord]) -> Self {
        let mut stat = Self {
            start,
            ..Self::default()
        };

        for record in records {
            let outcome = &record.outcome;
            stat.work += outcome.work;
            stat.wait += outcome.wait;
            stat.overhead += outcome.before + outcome.after;
            if outcome.rejected {
                stat.rejects += 1;
                stat.rejected_at.push(record.stage_name.clone());
            }
            if outcome.wait != 0 {
                stat.waits += 1;
                stat.waited_at.push(record.stage_name.clone());
            }
        }

        stat
    }

    pub fn total(&self) -> CpDuration {
        self.work + self.wait + self.overhead
    }

    pub fn finish(&self) -> CpTime {
        self.start + self.total()
    }
}

/// Cross-day rollup. The start time is taken from the left-hand side.
impl Add for TeamStat {
    type Output = TeamStat;

    fn add(mut self, rhs: TeamStat) -> TeamStat {
        self.work += rhs.work;
        self.wait += rhs.wait;
        self.overhead += rhs.overhead;
        self.rejects += rhs.rejects;
        self.waits += rhs.waits;
        self.rejected_at.extend(rhs.rejected_at);
        self.waited_at.extend(rhs.waited_at);
        self
    }
}

impl<'a> Add<&'a TeamStat> for TeamStat {
    type Output = TeamStat;

    fn add(self, rhs: &'a TeamStat) -> TeamStat {
        self + rhs.clone()
    }
}
