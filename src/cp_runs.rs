//! Repeated race runs
//!
//! A run is one or more race days. Each day the start-order policy lays out
//! start slots at the day's start line, the scheduler is driven until nothing
//! is pending and every team's day is folded into a [`TeamStat`]. After the
//! last day the stages close the run and a per-team report is produced.
//!
//! Stage logs and run summaries keep accumulating across runs, so the stage
//! rows reflect every completed run.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::cp_error::CpError;
use crate::cp_interface::{
    CpTime, Grade, SimSettings, StageId, StageKind, TeamId, DEFAULT_LEVEL, MINUTES_PER_HOUR,
};
use crate::cp_scheduler::Scheduler;
use crate::cp_stage::Stage;
use crate::cp_stats::{StageReportRow, StageTeamRecord, TeamStat};
use crate::cp_team::{Team, TeamSpec};
use crate::cp_topology::Topology;

/// Start line and start time of one race day
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct DayPlan {
    pub start_stage: String,
    pub start_time: CpTime,
}

impl DayPlan {
    pub fn new(start_stage: &str, start_time: CpTime) -> Self {
        Self {
            start_stage: start_stage.to_string(),
            start_time,
        }
    }
}

/// Configuration for a series of runs
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Number of repeated runs
    pub runs: usize,

    /// Random seed (None = generate random)
    pub seed: Option<[u8; 32]>,

    /// Quantile level for stage reports
    pub level: f64,

    /// Overheads and the capacity override
    pub settings: SimSettings,

    /// Race days in order
    pub days: Vec<DayPlan>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            runs: 1,
            seed: None,
            level: DEFAULT_LEVEL,
            settings: SimSettings::default(),
            days: vec![DayPlan::new("start", 6 * MINUTES_PER_HOUR)],
        }
    }
}

impl RaceConfig {
    /// Get or generate seed
    pub fn resolve_seed(&self) -> [u8; 32] {
        self.seed.unwrap_or_else(|| {
            let mut temp_rng = StdRng::from_entropy();
            let mut seed = [0u8; 32];
            temp_rng.fill_bytes(&mut seed);
            seed
        })
    }
}

// ============================================================================
// Start order
// ============================================================================

/// One team's start time at the day's start line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartSlot {
    pub team: TeamId,
    pub time: CpTime,
}

/// What a start-order policy sees when laying out a day
pub struct StartContext<'a> {
    /// Zero-based day index
    pub day: usize,
    /// Every team, with the closed stats of earlier days
    pub teams: &'a [Team],
    /// The day's start line
    pub stage: &'a Stage,
    /// Earliest start of the day
    pub time: CpTime,
}

/// Decides who starts when on each race day
pub trait StartOrder {
    fn slots(&mut self, ctx: &StartContext<'_>, rng: &mut StdRng) -> Vec<StartSlot>;
}

/// Roster order, `channels` teams per slot, slots spaced by the start line's
/// max time
#[derive(Debug, Clone, Copy, Default)]
pub struct RosterOrder;

impl StartOrder for RosterOrder {
    fn slots(&mut self, ctx: &StartContext<'_>, _rng: &mut StdRng) -> Vec<StartSlot> {
        let per_slot = ctx.stage.channels.max(1);
        ctx.teams
            .iter()
            .enumerate()
            .map(|(i, team)| StartSlot {
                team: team.id,
                time: ctx.time + (i / per_slot) as CpTime * ctx.stage.times.max,
            })
            .collect()
    }
}

// ============================================================================
// Reports
// ============================================================================

/// One team's result over a whole run
#[derive(Debug, Clone, PartialEq)]
pub struct TeamReportRow {
    pub team: TeamId,
    pub name: String,
    pub grade: Grade,
    pub days: Vec<TeamStat>,
    pub total: TeamStat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Zero-based run index
    pub run: usize,
    /// Events dispatched over all days
    pub events: u64,
    /// Ordered by grade, then by first-day start
    pub teams: Vec<TeamReportRow>,
}

/// Aggregate row of one stage over all completed runs
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: StageId,
    pub name: String,
    pub kind: StageKind,
    pub row: StageReportRow,
}

/// Latest visit of every team to one stage, in roster order
#[derive(Debug, Clone, PartialEq)]
pub struct StageDetail {
    pub stage: StageId,
    pub name: String,
    pub kind: StageKind,
    pub cells: Vec<Option<StageTeamRecord>>,
}

// ============================================================================
// Aggregator
// ============================================================================

pub struct RunAggregator<O> {
    config: RaceConfig,
    scheduler: Scheduler,
    order: O,
    starts: Vec<(StageId, CpTime)>,
    rng: StdRng,
    seed: [u8; 32],
    completed: usize,
}

impl<O: StartOrder> RunAggregator<O> {
    /// Resolve the day plans against `topology` and seed the generator.
    ///
    /// Fails if a day names an unknown stage or one that is not a start line.
    pub fn new(
        config: RaceConfig,
        topology: Topology,
        roster: &[TeamSpec],
        order: O,
    ) -> Result<Self, CpError> {
        let mut starts = Vec::with_capacity(config.days.len());
        for day in &config.days {
            let id = topology.id_of(&day.start_stage)?;
            let kind = topology.stage(id).map(|s| s.kind).unwrap_or_default();
            if kind != StageKind::Start {
                return Err(CpError::NotAStartStage {
                    stage: day.start_stage.clone(),
                    kind,
                });
            }
            starts.push((id, day.start_time));
        }

        let seed = config.resolve_seed();
        let scheduler = Scheduler::new(topology, roster, config.settings);

        Ok(Self {
            config,
            scheduler,
            order,
            starts,
            rng: StdRng::from_seed(seed),
            seed,
            completed: 0,
        })
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn seed(&self) -> [u8; 32] {
        self.seed
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs finished successfully so far
    pub fn completed_runs(&self) -> usize {
        self.completed
    }

    /// Play every day of one run and report the teams.
    ///
    /// On error the stages and teams are reset to a clean state and the error
    /// is returned; the failed run does not count as completed.
    pub fn run_once(&mut self) -> Result<RunReport, CpError> {
        let run = self.completed;
        log::info!("run {} started", run + 1);

        let events = match self.play_days() {
            Ok(events) => events,
            Err(e) => {
                self.scheduler.reset_run();
                return Err(e);
            }
        };

        self.scheduler.topology_mut().end_of_run();
        let report = self.team_report(run, events);
        for team in self.scheduler.teams_mut() {
            team.reset();
        }
        self.completed += 1;

        log::info!("run {} finished: {} events", run + 1, events);
        Ok(report)
    }

    /// Play all configured runs, handing each report to `sink`
    pub fn run_all<F: FnMut(&RunReport)>(&mut self, mut sink: F) -> Result<usize, CpError> {
        for _ in 0..self.config.runs {
            let report = self.run_once()?;
            sink(&report);
        }
        Ok(self.completed)
    }

    fn play_days(&mut self) -> Result<u64, CpError> {
        let mut events = 0;

        for (day, &(stage_id, time)) in self.starts.iter().enumerate() {
            let slots = {
                let stage = self
                    .scheduler
                    .topology()
                    .stage(stage_id)
                    .ok_or_else(|| CpError::UnknownStage {
                        name: stage_id.to_string(),
                    })?;
                let ctx = StartContext {
                    day,
                    teams: self.scheduler.teams(),
                    stage,
                    time,
                };
                self.order.slots(&ctx, &mut self.rng)
            };

            for slot in slots {
                self.scheduler.add_team(slot.team, stage_id, slot.time)?;
            }
            let count = self.scheduler.run(&mut self.rng)?;
            for team in self.scheduler.teams_mut() {
                team.close_day();
            }

            log::debug!("day {} finished: {} events", day + 1, count);
            events += count;
        }

        Ok(events)
    }

    fn team_report(&self, run: usize, events: u64) -> RunReport {
        let mut teams: Vec<TeamReportRow> = self
            .scheduler
            .teams()
            .iter()
            .map(|team| TeamReportRow {
                team: team.id,
                name: team.name.clone(),
                grade: team.grade,
                days: team.days().to_vec(),
                total: team.total_stat(),
            })
            .collect();
        teams.sort_by_key(|row| (row.grade, row.days.first().map_or(0, |d| d.start)));

        RunReport { run, events, teams }
    }

    /// Aggregate rows over all completed runs. Pass stages are left out.
    pub fn stage_reports(&self) -> Vec<StageReport> {
        self.scheduler
            .topology()
            .stages()
            .iter()
            .filter(|stage| stage.kind != StageKind::Pass)
            .map(|stage| StageReport {
                stage: stage.id,
                name: stage.name.clone(),
                kind: stage.kind,
                row: stage
                    .stats()
                    .row(self.completed, self.config.level, stage.times.max),
            })
            .collect()
    }

    /// Per-team cells of every stage, for single-run reports
    pub fn stage_details(&self) -> Vec<StageDetail> {
        let teams = self.scheduler.teams();
        self.scheduler
            .topology()
            .stages()
            .iter()
            .map(|stage| StageDetail {
                stage: stage.id,
                name: stage.name.clone(),
                kind: stage.kind,
                cells: teams
                    .iter()
                    .map(|team| stage.team_record(team.id).cloned())
                    .collect(),
            })
            .collect()
    }
}
