use serde::{Deserialize, Serialize};

use super::assignment::AgentCandidate;
use super::domain::{Category, Expertise, Profile, Status, Ticket, TicketId, UserId};

/// Storage abstraction so the service can be exercised without a database.
pub trait TicketRepository: Send + Sync {
    fn insert(&self, ticket: Ticket) -> Result<Ticket, RepositoryError>;
    fn fetch(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError>;
    /// Apply `apply` to the stored ticket as one conditional update.
    ///
    /// Implementations must hold the ticket exclusively for the duration of
    /// the call and persist the result only when `apply` returns `Ok`.
    fn update_with<T, E, F>(&self, id: TicketId, apply: F) -> Result<Result<T, E>, RepositoryError>
    where
        F: FnOnce(&mut Ticket) -> Result<T, E>;
    fn delete(&self, id: TicketId) -> Result<(), RepositoryError>;
    fn snapshot(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError>;
}

/// Lookup of user profiles and of agents eligible for a category.
pub trait ProfileDirectory: Send + Sync {
    fn profile(&self, user: UserId) -> Result<Option<Profile>, RepositoryError>;
    fn profiles(&self) -> Result<Vec<Profile>, RepositoryError>;
    /// Agents with the given expertise, each with a freshly counted workload.
    fn agent_candidates(
        &self,
        expertise: Expertise,
    ) -> Result<Vec<AgentCandidate>, RepositoryError>;
}

/// Outbound hook for closure e-mails or similar adapters.
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: ClosureNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureNotification {
    pub subject: String,
    pub message: String,
    pub recipient: String,
}

impl ClosureNotification {
    pub fn for_ticket(ticket: &Ticket, recipient: &str) -> Self {
        Self {
            subject: format!("Ticket closed: {}", ticket.title),
            message: format!(
                "Your ticket #{} \"{}\" has been closed. You can now rate the support.",
                ticket.id, ticket.title
            ),
            recipient: recipient.to_string(),
        }
    }
}

/// Typed ticket query. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub statuses: Vec<Status>,
    pub category: Option<Category>,
    pub assignee: Option<UserId>,
    pub reporter: Option<UserId>,
}

impl TicketFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self::all().with_statuses([Status::Open, Status::InDevelopment])
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn assigned_to(mut self, agent: UserId) -> Self {
        self.assignee = Some(agent);
        self
    }

    pub fn reported_by(mut self, reporter: UserId) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&ticket.status))
            && (self.category.is_none() || self.category == Some(ticket.category))
            && (self.assignee.is_none() || self.assignee == ticket.assignee)
            && (self.reporter.is_none() || self.reporter == Some(ticket.reporter))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
