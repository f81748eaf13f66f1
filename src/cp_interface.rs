// all times are simulated whole minutes since the simulation epoch
pub type CpTime = u64;
pub type CpDuration = u64;

// arena indices
pub type TeamId = usize;
pub type StageId = usize;

// team category selecting the outgoing edge at a branching stage
pub type Grade = i32;

pub const MINUTES_PER_HOUR: CpDuration = 60;
pub const MINUTES_PER_DAY: CpDuration = 24 * MINUTES_PER_HOUR;

/// Default quantile level for reports
pub const DEFAULT_LEVEL: f64 = 0.95;

/// Kind of a stage. Only a handful of behaviors differ between kinds, so they
/// share one state machine that branches on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize)]
pub enum StageKind {
    /// Start line. Teams are injected here by the start-order policy.
    Start,
    /// Timed technical stage with queueing and overheads.
    #[default]
    Tech,
    /// Pass-through checkpoint, queued but without overheads.
    Pass,
    /// Terminal stage. Arrivals are logged and never routed on.
    Finish,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageKind::Start => "Start",
            StageKind::Tech => "Tech",
            StageKind::Pass => "Pass",
            StageKind::Finish => "Finish",
        };
        f.write_str(name)
    }
}

/// Where in a stage's state machine a team sits when the event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPhase {
    Appear,
    StartOfService,
    EndOfService,
    Leave,
}

impl EventPhase {
    /// Order among events sharing a timestamp: channels are released before
    /// new teams try to claim them.
    pub fn rank(self) -> u8 {
        match self {
            EventPhase::EndOfService => 0,
            EventPhase::Leave => 1,
            EventPhase::Appear => 2,
            EventPhase::StartOfService => 3,
        }
    }
}

/// One team's pending transition at one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: CpTime,
    pub team: TeamId,
    pub stage: StageId,
    pub phase: EventPhase,
}

impl Event {
    pub fn new(time: CpTime, team: TeamId, stage: StageId, phase: EventPhase) -> Self {
        Self {
            time,
            team,
            stage,
            phase,
        }
    }
}

/// Ordering key of a pending event.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Phase rank (see [`EventPhase::rank`])
/// 3. Sequence number (creation order)
///
/// The sequence is global across all stages, so ties resolve the same way on
/// every run with the same seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: CpTime,
    pub rank: u8,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(event: &Event, sequence: u64) -> Self {
        Self {
            time: event.time,
            rank: event.phase.rank(),
            sequence,
        }
    }
}

/// Outcome of one team passing one stage. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageOutcome {
    /// Pre-service overhead
    pub before: CpDuration,
    /// Time spent in the wait queue
    pub wait: CpDuration,
    /// Service time actually applied (clamped to the stage max on rejection)
    pub work: CpDuration,
    /// Sampled duration exceeded the stage max
    pub rejected: bool,
    /// Post-service overhead
    pub after: CpDuration,
}

/// Settings shared by every stage for a whole simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimSettings {
    /// Nominal pre-service overhead for Tech stages
    pub before: CpDuration,
    /// Nominal post-service overhead for Tech stages
    pub after: CpDuration,
    /// Ignore stage capacities (estimate required throughput)
    pub unlimited: bool,
}

/// Format a simulated time as `d+HH:MM`
pub fn format_time(time: CpTime) -> String {
    let day = time / MINUTES_PER_DAY;
    let minutes = time % MINUTES_PER_DAY;
    format!(
        "{}+{:02}:{:02}",
        day,
        minutes / MINUTES_PER_HOUR,
        minutes % MINUTES_PER_HOUR
    )
}

/// Format a duration as `HH:MM`
pub fn format_duration(duration: CpDuration) -> String {
    format!(
        "{:02}:{:02}",
        duration / MINUTES_PER_HOUR,
        duration % MINUTES_PER_HOUR
    )
}
