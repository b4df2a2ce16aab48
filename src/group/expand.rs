//! Per-pass state for expanding group instances into the world.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
};

use enum_map::EnumMap;
use itertools::Itertools;

use crate::{group::GroupInstance, obstacle::ObstacleType};

/// Recursion state threaded through one expansion of the world.
///
/// Holds the set of templates currently being expanded (indices into the
/// template list), so a template reached again while it is still open is a
/// cycle, and the path of instance names used to give teleporters stable,
/// distinguishable names.
#[derive(Debug, Default)]
pub struct ExpansionContext {
    active: HashSet<usize>,
    depth_name: Vec<String>,
    report: ExpansionReport,
}

impl ExpansionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_depth_name(&mut self) {
        self.depth_name.clear();
    }

    pub fn depth(&self) -> usize {
        self.depth_name.len()
    }

    /// Marks template `ix` as being expanded. Returns `false` if it already
    /// is, meaning a cycle has been reached.
    pub fn enter(&mut self, ix: usize) -> bool {
        self.active.insert(ix)
    }

    pub fn leave(&mut self, ix: usize) {
        self.active.remove(&ix);
    }

    pub fn is_active(&self, ix: usize) -> bool {
        self.active.contains(&ix)
    }

    /// Pushes the path segment for `group`, the `index`th instance of its
    /// parent definition.
    pub fn append_group_name(&mut self, group: &GroupInstance, index: usize) {
        let segment = match group.get_name() {
            "" => format!("{}:{index}", group.get_group_def()),
            name => name.to_string(),
        };
        self.depth_name.push(segment);
    }

    pub fn pop_group_name(&mut self) {
        self.depth_name.pop();
    }

    /// The name for a teleporter at position `pos` of its definition's list,
    /// qualified by the current instance path.
    pub fn make_tele_name(&self, name: &str, pos: usize) -> String {
        let base = if name.is_empty() { format!("t{pos}") } else { name.to_string() };
        self.depth_name.iter().map(String::as_str).chain([base.as_str()]).join("/")
    }

    pub fn report(&self) -> &ExpansionReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut ExpansionReport {
        &mut self.report
    }

    pub fn into_report(self) -> ExpansionReport {
        self.report
    }
}

/// What happened during one world expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    pub produced: EnumMap<ObstacleType, usize>,
    /// Names of group definitions that instances referred to but don't exist
    pub unresolved: Vec<String>,
    /// Group definitions whose instantiation was skipped to break a cycle
    pub cycles: Vec<String>,
    pub invalid_dropped: usize,
    pub max_depth: usize,
    /// Nothing was expanded; the world decoded from the wire was kept
    pub kept_received_world: bool,
}

impl ExpansionReport {
    pub fn total_produced(&self) -> usize {
        self.produced.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.cycles.is_empty() && self.invalid_dropped == 0
    }
}

impl Display for ExpansionReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} obstacles", self.total_produced())?;
        if self.kept_received_world {
            write!(f, " kept from the received world")?;
        }
        let counts = self.produced.iter().filter(|&(_, &n)| n > 0).map(|(t, n)| format!("{t}: {n}"));
        write!(f, " ({})", counts.format(", "))?;
        write!(f, ", depth {}", self.max_depth)?;
        if !self.unresolved.is_empty() {
            write!(f, ", unresolved: {}", self.unresolved.iter().unique().join(", "))?;
        }
        if !self.cycles.is_empty() {
            write!(f, ", cycles broken at: {}", self.cycles.iter().unique().join(", "))?;
        }
        if self.invalid_dropped > 0 {
            write!(f, ", {} invalid dropped", self.invalid_dropped)?;
        }
        Ok(())
    }
}
