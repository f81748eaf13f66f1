//! # cp_rust - Cross-country race simulation
//!
//! A discrete-event simulator of teams moving through the stages of a
//! multi-day cross-country race. Stages have limited service channels, teams
//! queue when they are full, and service times are drawn from a bounded
//! approximately normal distribution. Repeating the race many times gives
//! stage load, busy windows and waiting statistics for planning the course.
//!
//! ## Core Components
//!
//! - **Stage**: per-stage state machine (appear, start, end, leave) with FIFO queueing
//! - **Topology**: stage arena with per-grade edges
//! - **Scheduler**: global event loop with deterministic tie-breaking
//! - **RunAggregator**: multi-day runs, team reports and stage statistics
//! - **OrderStat/PhaseStat/TeamStat**: order statistics and report rows
//!
//! ## Usage
//!
//! ```no_run
//! use cp_rust::{
//!     DayPlan, LinkSpec, RaceConfig, RosterOrder, RunAggregator, StageKind, StageSpec,
//!     StageTimes, TeamSpec, Topology,
//! };
//!
//! let stages = vec![
//!     StageSpec::new("start", StageKind::Start, 1, StageTimes::new(0, 5, 5, 0.0)),
//!     StageSpec::new("rope", StageKind::Tech, 2, StageTimes::new(10, 30, 60, 0.2)),
//!     StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
//! ];
//! let links = vec![LinkSpec::new(0, &["start", "rope", "finish"])];
//! let topology = Topology::build(&stages, &links).unwrap();
//!
//! let config = RaceConfig {
//!     runs: 100,
//!     days: vec![DayPlan::new("start", 6 * 60)],
//!     ..RaceConfig::default()
//! };
//! let teams = vec![TeamSpec::new("Alpha", 0, 1.0), TeamSpec::new("Beta", 1, 0.9)];
//! let mut aggregator = RunAggregator::new(config, topology, &teams, RosterOrder).unwrap();
//!
//! aggregator.run_all(|report| println!("run {}: {} events", report.run, report.events)).unwrap();
//! for stage in aggregator.stage_reports() {
//!     println!("{}: max load {}", stage.name, stage.row.max_load);
//! }
//! ```
//!
//! ## Simulator
//!
//! The `race_runner` binary in `simulator/` loads a YAML race file, applies
//! the start-order policies and writes TSV reports.

// Data model and errors
pub mod cp_error;
pub mod cp_interface;

// Sampling and statistics
pub mod cp_duration;
pub mod cp_stats;

// Simulation
pub mod cp_runs;
pub mod cp_scheduler;
pub mod cp_stage;
pub mod cp_team;
pub mod cp_topology;

// Re-export commonly used types
pub use cp_duration::StageTimes;
pub use cp_error::CpError;
pub use cp_interface::{
    format_duration, format_time, CpDuration, CpTime, Event, EventPhase, Grade, SimSettings,
    StageId, StageKind, StageOutcome, TeamId, DEFAULT_LEVEL, MINUTES_PER_DAY, MINUTES_PER_HOUR,
};
pub use cp_runs::{
    DayPlan, RaceConfig, RosterOrder, RunAggregator, RunReport, StageDetail, StageReport,
    StartContext, StartOrder, StartSlot, TeamReportRow,
};
pub use cp_scheduler::Scheduler;
pub use cp_stage::{Stage, StageSpec};
pub use cp_stats::{OrderStat, PhaseStat, StageReportRow, TeamStat, TimeStat};
pub use cp_team::{Team, TeamSpec};
pub use cp_topology::{LinkSpec, Topology};
