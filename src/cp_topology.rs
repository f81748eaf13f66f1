//! Race network
//!
//! Stages live in an arena indexed by [`StageId`]; edges are per-stage
//! `grade -> StageId` lookups into the same arena, so the graph carries no
//! owning references between stages.

use indexmap::IndexMap;

use crate::cp_error::CpError;
use crate::cp_interface::{EventKey, Grade, StageId, StageKind};
use crate::cp_stage::{Stage, StageSpec};
use crate::cp_stats::PhaseStat;

/// Chain of stages followed by teams of one grade
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct LinkSpec {
    #[serde(default)]
    pub grade: Grade,
    pub sequence: Vec<String>,
}

impl LinkSpec {
    pub fn new(grade: Grade, sequence: &[&str]) -> Self {
        Self {
            grade,
            sequence: sequence.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    stages: Vec<Stage>,
    by_name: IndexMap<String, StageId>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the network from stage descriptions and link chains.
    ///
    /// Consecutive names in a link sequence become edges for the link's
    /// grade. Fails on duplicate stage names, empty sequences, empty names
    /// and names that match no stage.
    pub fn build(stages: &[StageSpec], links: &[LinkSpec]) -> Result<Self, CpError> {
        let mut topology = Self::new();
        for spec in stages {
            topology.add_stage(spec)?;
        }
        for link in links {
            topology.link(link.grade, &link.sequence)?;
        }

        log::debug!(
            "topology built: {} stages, {} links",
            topology.len(),
            links.len()
        );
        Ok(topology)
    }

    pub fn add_stage(&mut self, spec: &StageSpec) -> Result<StageId, CpError> {
        if self.by_name.contains_key(&spec.name) {
            return Err(CpError::DuplicateStage {
                name: spec.name.clone(),
            });
        }
        let id = self.stages.len();
        self.stages.push(Stage::new(id, spec));
        self.by_name.insert(spec.name.clone(), id);
        Ok(id)
    }

    /// Add edges along `sequence` for `grade`
    pub fn link<S: AsRef<str>>(&mut self, grade: Grade, sequence: &[S]) -> Result<(), CpError> {
        let ids = sequence
            .iter()
            .map(|name| self.key(grade, name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if ids.is_empty() {
            return Err(CpError::EmptySequence { grade });
        }

        for pair in ids.windows(2) {
            self.stages[pair[0]].add_link(grade, pair[1]);
        }
        Ok(())
    }

    fn key(&self, grade: Grade, name: &str) -> Result<StageId, CpError> {
        if name.is_empty() {
            return Err(CpError::EmptySequenceEntry { grade });
        }
        self.id_of(name)
    }

    pub fn id_of(&self, name: &str) -> Result<StageId, CpError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CpError::UnknownStage {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id)
    }

    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Stage> {
        self.by_name.get(name).map(|&id| &self.stages[id])
    }

    /// Stages in definition order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage holding the earliest pending event, scanning every stage
    pub fn next_event(&self) -> Option<(StageId, EventKey)> {
        self.stages
            .iter()
            .filter_map(|stage| stage.next_key().map(|key| (stage.id, key)))
            .min_by_key(|&(_, key)| key)
    }

    /// Follow the edges for `grade` from `from` until a Finish stage.
    ///
    /// Returns the visited stages in order. A cycle ends the walk at the first
    /// repeated stage.
    pub fn trace_route(&self, from: StageId, grade: Grade) -> Result<Vec<StageId>, CpError> {
        let mut route = Vec::new();
        let mut current = from;

        loop {
            let stage = self.stage(current).ok_or_else(|| CpError::UnknownStage {
                name: current.to_string(),
            })?;
            if route.contains(&current) {
                return Ok(route);
            }
            route.push(current);

            if stage.kind == StageKind::Finish {
                return Ok(route);
            }
            current = stage.next_stage(grade).ok_or_else(|| CpError::MissingRoute {
                stage: stage.name.clone(),
                kind: stage.kind,
                grade,
            })?;
        }
    }

    /// Close the run on every stage
    pub fn end_of_run(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.end_of_run();
        }
    }

    /// Drop per-run state on every stage
    pub fn reset_run(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset_run();
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stages.iter().all(|s| s.is_idle())
    }

    pub fn clear_stats(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.clear_stats();
        }
    }

    /// Statistics of every stage in definition order
    pub fn stats(&self) -> Vec<(&Stage, PhaseStat)> {
        self.stages.iter().map(|s| (s, s.stats())).collect()
    }
}
