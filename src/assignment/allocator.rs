use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::assignment::state::{AssignmentState, StateStore};
use crate::assignment::workload::{AssignmentStats, LeadWorkloadSnapshot};
use crate::config::AllocatorConfig;
use crate::error::{AdmissionsError, Result};
use crate::leads::{LeadAssignment, LeadStore};

/// Outcome of the selection step for one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Choice {
    /// Roster index of the selected member.
    pub index: usize,
    /// Cursor to store for the program: the position right after `index`.
    pub next_cursor: usize,
    /// True when the workload override replaced the round-robin candidate.
    pub rebalanced: bool,
}

/// Pick the member for the next lead.
///
/// The round-robin candidate is `roster[cursor]`. With a workload snapshot,
/// a candidate carrying more than `min_load + threshold` leads is replaced by
/// the first least-loaded member found scanning forward from `cursor`.
/// Returns `None` for an empty roster.
pub(crate) fn choose(
    roster: &[String],
    cursor: usize,
    workload: Option<&LeadWorkloadSnapshot>,
    threshold: u64,
) -> Option<Choice> {
    let size = roster.len();
    if size == 0 {
        return None;
    }
    let cursor = cursor % size;

    let index = match workload {
        Some(snapshot) => {
            let min_load = snapshot.min_load();
            if snapshot.load_of(&roster[cursor]) <= min_load.saturating_add(threshold) {
                cursor
            } else {
                (0..size)
                    .map(|offset| (cursor + offset) % size)
                    .find(|&i| snapshot.load_of(&roster[i]) == min_load)
                    .unwrap_or(cursor)
            }
        }
        None => cursor,
    };

    Some(Choice {
        index,
        next_cursor: (index + 1) % size,
        rebalanced: index != cursor,
    })
}

/// Result of [`AssignmentAllocator::allocate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub program: String,
    pub member: String,
    pub position: usize,
    pub next_cursor: usize,
    pub rebalanced: bool,
    /// False when the advanced cursor could not be saved. The allocation still stands.
    pub persisted: bool,
}

/// Per-program round-robin allocator with an optional workload override.
///
/// Each program's cursor sits behind its own lock, so allocations for the
/// same program are serialized while different programs proceed in parallel.
/// The workload query runs before the lock is taken.
pub struct AssignmentAllocator {
    config: AllocatorConfig,
    cursors: HashMap<String, Mutex<usize>>,
    state_store: Arc<dyn StateStore>,
    leads: Arc<dyn LeadStore>,
    persist_lock: Mutex<()>,
}

impl AssignmentAllocator {
    /// Create an allocator with every cursor at zero.
    pub fn new(
        config: AllocatorConfig,
        state_store: Arc<dyn StateStore>,
        leads: Arc<dyn LeadStore>,
    ) -> Result<Self> {
        let state = AssignmentState::zeroed(config.programs.iter().cloned());
        Self::with_state(config, state, state_store, leads)
    }

    /// Create an allocator from whatever the state store holds.
    ///
    /// Missing, corrupt or unreadable state starts every cursor at zero.
    pub async fn restore(
        config: AllocatorConfig,
        state_store: Arc<dyn StateStore>,
        leads: Arc<dyn LeadStore>,
    ) -> Result<Self> {
        config.validate()?;

        let state = match state_store.load_state().await {
            Ok(Some(saved)) => {
                tracing::debug!(programs = saved.len(), "Restored assignment state");
                saved.normalized(&config.programs, config.roster.len())
            }
            Ok(None) => AssignmentState::zeroed(config.programs.iter().cloned()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load assignment state, starting from zero");
                AssignmentState::zeroed(config.programs.iter().cloned())
            }
        };

        Self::with_state(config, state, state_store, leads)
    }

    fn with_state(
        config: AllocatorConfig,
        state: AssignmentState,
        state_store: Arc<dyn StateStore>,
        leads: Arc<dyn LeadStore>,
    ) -> Result<Self> {
        config.validate()?;

        let state = state.normalized(&config.programs, config.roster.len());
        let cursors = state
            .iter()
            .map(|(program, cursor)| (program.to_string(), Mutex::new(cursor)))
            .collect();

        Ok(Self {
            config,
            cursors,
            state_store,
            leads,
            persist_lock: Mutex::new(()),
        })
    }

    /// Choose the team member for the next lead of `program`.
    pub async fn allocate_next(&self, program: &str) -> Result<String> {
        self.allocate(program).await.map(|allocation| allocation.member)
    }

    /// Like [`allocate_next`](Self::allocate_next), reporting how the member was chosen.
    pub async fn allocate(&self, program: &str) -> Result<Allocation> {
        let slot = self
            .cursors
            .get(program)
            .ok_or_else(|| self.invalid_program(program))?;

        let workload = if self.config.workload_aware {
            match self.fetch_workload().await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(program, error = %e, "Falling back to round-robin assignment");
                    None
                }
            }
        } else {
            None
        };

        let choice = {
            let mut cursor = slot.lock().await;
            let choice = choose(
                &self.config.roster,
                *cursor,
                workload.as_ref(),
                self.config.rebalance_threshold,
            )
            .ok_or_else(|| AdmissionsError::InvalidConfig("team roster is empty".to_string()))?;
            *cursor = choice.next_cursor;
            choice
        };

        let persisted = match self.persist().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(program, error = %e, "Assignment cursor advanced in memory only");
                false
            }
        };

        let member = self.config.roster[choice.index].clone();
        tracing::info!(
            program,
            member = %member,
            position = choice.index,
            rebalanced = choice.rebalanced,
            "Lead assigned"
        );

        Ok(Allocation {
            program: program.to_string(),
            member,
            position: choice.index,
            next_cursor: choice.next_cursor,
            rebalanced: choice.rebalanced,
            persisted,
        })
    }

    /// Current workload per roster member, bounded by the configured timeout.
    pub async fn fetch_workload(&self) -> Result<LeadWorkloadSnapshot> {
        let rows = self.query_assignments().await?;
        Ok(LeadWorkloadSnapshot::from_assignments(
            &self.config.roster,
            &rows,
        ))
    }

    /// Leads currently assigned, per program and member.
    pub async fn assignment_stats(&self) -> Result<AssignmentStats> {
        let rows = self.query_assignments().await?;
        Ok(AssignmentStats::from_assignments(
            &self.config.programs,
            &self.config.roster,
            &rows,
        ))
    }

    async fn query_assignments(&self) -> Result<Vec<LeadAssignment>> {
        let timeout = Duration::from_millis(self.config.workload_timeout_ms);
        match tokio::time::timeout(timeout, self.leads.query_lead_assignments()).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(AdmissionsError::WorkloadLookupFailed(e.to_string())),
            Err(_) => Err(AdmissionsError::WorkloadLookupFailed(format!(
                "timed out after {}ms",
                self.config.workload_timeout_ms
            ))),
        }
    }

    /// Zero every program's cursor.
    pub async fn reset(&self) {
        {
            let mut guards = Vec::with_capacity(self.cursors.len());
            for program in &self.config.programs {
                if let Some(slot) = self.cursors.get(program) {
                    guards.push(slot.lock().await);
                }
            }
            for guard in guards.iter_mut() {
                **guard = 0;
            }
        }

        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "Assignment reset not persisted");
        }
        tracing::info!("Assignment state reset");
    }

    pub fn current_roster(&self) -> &[String] {
        &self.config.roster
    }

    pub fn current_programs(&self) -> &[String] {
        &self.config.programs
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub async fn cursor(&self, program: &str) -> Option<usize> {
        match self.cursors.get(program) {
            Some(slot) => Some(*slot.lock().await),
            None => None,
        }
    }

    /// Copy of every program's cursor.
    pub async fn state(&self) -> AssignmentState {
        let mut state = AssignmentState::default();
        for program in &self.config.programs {
            if let Some(slot) = self.cursors.get(program) {
                state.set_cursor(program.clone(), *slot.lock().await);
            }
        }
        state
    }

    // The snapshot is taken under the persistence lock so a later save never
    // writes older cursors than an earlier one.
    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let state = self.state().await;
        self.state_store
            .save_state(&state)
            .await
            .map_err(|e| AdmissionsError::StatePersistenceFailed(e.to_string()))
    }

    fn invalid_program(&self, program: &str) -> AdmissionsError {
        AdmissionsError::InvalidProgram {
            program: program.to_string(),
            valid: self.config.programs.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn without_workload_picks_cursor() {
        let roster = roster();
        for cursor in 0..3 {
            let choice = choose(&roster, cursor, None, 2).unwrap();
            assert_eq!(choice.index, cursor);
            assert_eq!(choice.next_cursor, (cursor + 1) % 3);
            assert!(!choice.rebalanced);
        }
    }

    #[test]
    fn out_of_range_cursor_wraps() {
        let choice = choose(&roster(), 4, None, 2).unwrap();
        assert_eq!(choice.index, 1);
        assert_eq!(choice.next_cursor, 2);
    }

    #[test]
    fn candidate_within_threshold_is_kept() {
        let roster = roster();
        let snapshot = LeadWorkloadSnapshot::from_counts(&roster, [("A", 2), ("B", 0), ("C", 1)]);
        let choice = choose(&roster, 0, Some(&snapshot), 2).unwrap();
        assert_eq!(choice.index, 0);
        assert!(!choice.rebalanced);
    }

    #[test]
    fn overloaded_candidate_is_skipped() {
        let roster = roster();
        let snapshot = LeadWorkloadSnapshot::from_counts(&roster, [("A", 5), ("B", 0), ("C", 5)]);
        let choice = choose(&roster, 0, Some(&snapshot), 2).unwrap();
        assert_eq!(choice.index, 1);
        assert_eq!(choice.next_cursor, 2);
        assert!(choice.rebalanced);
    }

    #[test]
    fn tie_scan_starts_at_cursor() {
        let roster = vec![
            "A".to_string(),
            "B".to_string(),
            "C".to_string(),
            "D".to_string(),
        ];
        let snapshot =
            LeadWorkloadSnapshot::from_counts(&roster, [("A", 0), ("B", 0), ("C", 9), ("D", 1)]);
        // C is overloaded; scanning C, D, A finds A before B.
        let choice = choose(&roster, 2, Some(&snapshot), 2).unwrap();
        assert_eq!(choice.index, 0);
        assert_eq!(choice.next_cursor, 1);
    }

    #[test]
    fn empty_roster_has_no_choice() {
        assert_eq!(choose(&[], 3, None, 2), None);
        let snapshot = LeadWorkloadSnapshot::default();
        assert_eq!(choose(&[], 0, Some(&snapshot), 0), None);
    }

    #[test]
    fn zero_threshold_always_prefers_minimum() {
        let roster = roster();
        let snapshot = LeadWorkloadSnapshot::from_counts(&roster, [("A", 1), ("B", 1), ("C", 0)]);
        let choice = choose(&roster, 0, Some(&snapshot), 0).unwrap();
        assert_eq!(choice.index, 2);
        assert_eq!(choice.next_cursor, 0);
    }
}
