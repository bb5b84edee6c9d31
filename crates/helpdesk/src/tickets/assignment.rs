use serde::Serialize;
use tracing::debug;

use super::domain::{Ticket, UserId};
use super::repository::{ProfileDirectory, RepositoryError};

/// An agent eligible for a ticket, annotated with its current workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentCandidate {
    pub agent: UserId,
    pub username: String,
    /// Assigned tickets that are not closed yet.
    pub workload: usize,
}

/// Least-loaded agent, ties broken by the lower agent id.
pub fn select_assignee(candidates: &[AgentCandidate]) -> Option<UserId> {
    candidates
        .iter()
        .min_by_key(|candidate| (candidate.workload, candidate.agent))
        .map(|candidate| candidate.agent)
}

/// Picks an assignee for newly created tickets.
pub struct AssignmentEngine;

impl AssignmentEngine {
    /// Returns `None` when no agent carries the ticket's category as expertise.
    pub fn assign<D>(ticket: &Ticket, directory: &D) -> Result<Option<UserId>, RepositoryError>
    where
        D: ProfileDirectory + ?Sized,
    {
        let candidates = directory.agent_candidates(ticket.category)?;
        let chosen = select_assignee(&candidates);
        debug!(
            ticket = %ticket.id,
            category = ticket.category.label(),
            candidates = candidates.len(),
            assignee = ?chosen,
            "assignment evaluated"
        );
        Ok(chosen)
    }
}
