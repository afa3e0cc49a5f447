use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::leads::LeadAssignment;

/// Point-in-time count of leads per roster member.
///
/// Every roster member has an entry; members with no leads count as zero.
/// Assignees that are not on the roster are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadWorkloadSnapshot {
    loads: HashMap<String, u64>,
}

impl LeadWorkloadSnapshot {
    pub fn from_assignments(roster: &[String], rows: &[LeadAssignment]) -> Self {
        let mut loads: HashMap<String, u64> = roster.iter().map(|m| (m.clone(), 0)).collect();
        for assignee in rows.iter().filter_map(|row| row.assignee.as_deref()) {
            if let Some(count) = loads.get_mut(assignee) {
                *count += 1;
            }
        }
        Self { loads }
    }

    pub fn from_counts<I, S>(roster: &[String], counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        let mut loads: HashMap<String, u64> = roster.iter().map(|m| (m.clone(), 0)).collect();
        for (member, count) in counts {
            if let Some(slot) = loads.get_mut(member.as_ref()) {
                *slot = count;
            }
        }
        Self { loads }
    }

    pub fn load_of(&self, member: &str) -> u64 {
        self.loads.get(member).copied().unwrap_or(0)
    }

    pub fn min_load(&self) -> u64 {
        self.loads.values().copied().min().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.loads.values().sum()
    }
}

/// Leads currently assigned, per program and member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssignmentStats {
    programs: BTreeMap<String, BTreeMap<String, u64>>,
}

impl AssignmentStats {
    pub fn from_assignments(programs: &[String], roster: &[String], rows: &[LeadAssignment]) -> Self {
        let mut stats: BTreeMap<String, BTreeMap<String, u64>> = programs
            .iter()
            .map(|p| (p.clone(), roster.iter().map(|m| (m.clone(), 0)).collect()))
            .collect();

        for row in rows {
            let (Some(program), Some(assignee)) = (row.program.as_deref(), row.assignee.as_deref())
            else {
                continue;
            };
            if let Some(count) = stats.get_mut(program).and_then(|m| m.get_mut(assignee)) {
                *count += 1;
            }
        }

        Self { programs: stats }
    }

    pub fn count(&self, program: &str, member: &str) -> u64 {
        self.programs
            .get(program)
            .and_then(|members| members.get(member))
            .copied()
            .unwrap_or(0)
    }

    pub fn program(&self, program: &str) -> Option<&BTreeMap<String, u64>> {
        self.programs.get(program)
    }
}
