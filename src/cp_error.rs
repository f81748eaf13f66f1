//! Error taxonomy for the race simulation
//!
//! Configuration and internal consistency errors are fatal: they abort the
//! current run. Statistical edge cases and rejections are not errors.

use crate::cp_interface::{Grade, StageKind, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpError {
    /// A team reached a non-terminal stage that has no edge for its category
    #[error("route broken at stage '{stage}' ({kind}) for grade {grade}")]
    MissingRoute {
        stage: String,
        kind: StageKind,
        grade: Grade,
    },

    /// A link or day plan names a stage that does not exist
    #[error("no stage '{name}', check stage names against link sequences")]
    UnknownStage { name: String },

    /// A link sequence contains an empty stage name
    #[error("empty stage name in link sequence for grade {grade}")]
    EmptySequenceEntry { grade: Grade },

    /// A link sequence has no stages
    #[error("empty link sequence for grade {grade}")]
    EmptySequence { grade: Grade },

    /// Two stages share one name
    #[error("stage '{name}' defined more than once")]
    DuplicateStage { name: String },

    /// Stage bookkeeping lost track of a team it should hold
    #[error("stage '{stage}' does not hold team '{team}'")]
    TeamNotPresent { stage: String, team: String },

    /// A team was injected while still occupying a stage
    #[error("team '{team}' is still at stage '{stage}'")]
    TeamAlreadyActive { team: String, stage: String },

    /// Start-line injection aimed at a stage that is not a start line
    #[error("stage '{stage}' is {kind}, teams can only be started at a Start stage")]
    NotAStartStage { stage: String, kind: StageKind },

    /// Team id outside the roster
    #[error("no team with id {id}")]
    UnknownTeam { id: TeamId },
}
