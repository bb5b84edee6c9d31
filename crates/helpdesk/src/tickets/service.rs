use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::assignment::AssignmentEngine;
use super::domain::{
    Category, NewTicket, Profile, Ticket, TicketId, TicketUpdate, UserId, ValidationError,
};
use super::lifecycle::{self, LifecycleError, TransitionEffect};
use super::report::{
    generate_report, to_csv_string, Cadence, PeriodRow, ReportError, DEFAULT_PERIODS,
};
use super::repository::{
    ClosureNotification, NotificationSink, ProfileDirectory, RepositoryError, TicketFilter,
    TicketRepository,
};
use super::statistics::{StatisticsDashboard, Usernames};

/// Source of "now" for timestamps and report windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Service composing the ticket store, profile directory and notification sink.
pub struct HelpdeskService<R, D, N> {
    repository: Arc<R>,
    directory: Arc<D>,
    notifications: Arc<N>,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    report_periods: usize,
}

impl<R, D, N> HelpdeskService<R, D, N>
where
    R: TicketRepository + 'static,
    D: ProfileDirectory + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>, notifications: Arc<N>) -> Self {
        Self {
            repository,
            directory,
            notifications,
            clock: Arc::new(SystemClock),
            sequence: AtomicU64::new(1),
            report_periods: DEFAULT_PERIODS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Periods used when a report request does not name a count.
    pub fn with_report_periods(mut self, periods: usize) -> Self {
        self.report_periods = periods.max(1);
        self
    }

    fn next_ticket_id(&self) -> TicketId {
        TicketId(self.sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// Profile of a signed-in user. Unknown ids are rejected.
    pub fn authenticate(&self, user: UserId) -> Result<Profile, TicketServiceError> {
        self.directory
            .profile(user)?
            .ok_or(TicketServiceError::ProfileNotFound(user))
    }

    fn load(&self, id: TicketId) -> Result<Ticket, TicketServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(TicketServiceError::TicketNotFound(id))
    }

    /// File a ticket for `reporter` and hand it to the least-loaded matching agent.
    pub fn create(
        &self,
        reporter: UserId,
        submission: NewTicket,
    ) -> Result<Ticket, TicketServiceError> {
        submission.validate()?;
        self.authenticate(reporter)?;

        let mut ticket = Ticket::open(
            self.next_ticket_id(),
            submission,
            reporter,
            self.clock.now(),
        );
        ticket.assignee = AssignmentEngine::assign(&ticket, self.directory.as_ref())?;

        let stored = self.repository.insert(ticket)?;
        info!(
            ticket = %stored.id,
            reporter = %reporter,
            category = stored.category.label(),
            assignee = ?stored.assignee,
            "ticket created"
        );
        Ok(stored)
    }

    pub fn get(&self, actor: UserId, id: TicketId) -> Result<Ticket, TicketServiceError> {
        let profile = self.authenticate(actor)?;
        let ticket = self.load(id)?;
        ensure_reporter_access(&profile, &ticket)?;
        Ok(ticket)
    }

    /// Tickets assigned to an agent, or filed by a reporter, optionally of one category.
    pub fn list(
        &self,
        actor: UserId,
        include_closed: bool,
        category: Option<Category>,
    ) -> Result<Vec<Ticket>, TicketServiceError> {
        let profile = self.authenticate(actor)?;
        let filter = if include_closed {
            TicketFilter::all()
        } else {
            TicketFilter::active()
        };
        let filter = if profile.is_agent {
            filter.assigned_to(actor)
        } else {
            filter.reported_by(actor)
        };
        let filter = match category {
            Some(category) => filter.in_category(category),
            None => filter,
        };

        let mut tickets = self.repository.snapshot(&filter)?;
        tickets.sort_by_key(|ticket| ticket.id);
        Ok(tickets)
    }

    /// Field-level update. Status and assignee changes are reserved for agents.
    pub fn update(
        &self,
        actor: UserId,
        id: TicketId,
        patch: TicketUpdate,
    ) -> Result<Ticket, TicketServiceError> {
        patch.validate()?;
        let profile = self.authenticate(actor)?;
        if !profile.is_agent && patch.touches_agent_fields() {
            let field = if patch.status.is_some() {
                "status"
            } else {
                "assignee"
            };
            return Err(AuthorizationError::AgentOnlyField(field).into());
        }

        let current = self.load(id)?;
        ensure_reporter_access(&profile, &current)?;

        if let Some(assignee) = patch.assignee {
            let is_agent = self
                .directory
                .profile(assignee)?
                .is_some_and(|candidate| candidate.is_agent);
            if !is_agent {
                return Err(ValidationError::NotAnAgent(assignee).into());
            }
        }

        let now = self.clock.now();
        let (ticket, effect) = self
            .repository
            .update_with(id, |ticket| {
                let effect = lifecycle::transition(ticket, patch.status, now)?;
                if let Some(title) = patch.title {
                    ticket.title = title;
                }
                if let Some(description) = patch.description {
                    ticket.description = description;
                }
                if let Some(assignee) = patch.assignee {
                    ticket.assignee = Some(assignee);
                }
                Ok::<_, LifecycleError>((ticket.clone(), effect))
            })
            .map_err(|err| ticket_error(id, err))??;

        if patch.status.is_some() {
            info!(
                ticket = %id,
                actor = %actor,
                status = ticket.status.label(),
                started = effect.started_now,
                closed = effect.closed_now,
                "ticket status updated"
            );
        }
        self.dispatch_effects(&ticket, effect);

        Ok(ticket)
    }

    /// Reporter scores a closed ticket; later ratings overwrite earlier ones.
    pub fn rate(
        &self,
        actor: UserId,
        id: TicketId,
        value: i64,
    ) -> Result<Ticket, TicketServiceError> {
        let current = self.load(id)?;
        if current.reporter != actor {
            return Err(AuthorizationError::NotOwner {
                user: actor,
                ticket: id,
            }
            .into());
        }

        let ticket = self
            .repository
            .update_with(id, |ticket| {
                lifecycle::rate(ticket, value)?;
                Ok::<_, LifecycleError>(ticket.clone())
            })
            .map_err(|err| ticket_error(id, err))??;

        info!(ticket = %id, rating = value, "ticket rated");
        Ok(ticket)
    }

    /// Only the reporter may delete a ticket.
    pub fn delete(&self, actor: UserId, id: TicketId) -> Result<(), TicketServiceError> {
        let current = self.load(id)?;
        if current.reporter != actor {
            return Err(AuthorizationError::NotOwner {
                user: actor,
                ticket: id,
            }
            .into());
        }

        self.repository
            .delete(id)
            .map_err(|err| ticket_error(id, err))?;
        info!(ticket = %id, actor = %actor, "ticket deleted");
        Ok(())
    }

    pub fn statistics(&self) -> Result<StatisticsDashboard, TicketServiceError> {
        let tickets = self.repository.snapshot(&TicketFilter::all())?;
        let usernames = self.usernames()?;
        Ok(StatisticsDashboard::compute(&tickets, &usernames))
    }

    /// Period rows for the cadence, most recent window first.
    pub fn report(
        &self,
        cadence: Cadence,
        periods: Option<usize>,
    ) -> Result<Vec<PeriodRow>, TicketServiceError> {
        let tickets = self.repository.snapshot(&TicketFilter::all())?;
        let usernames = self.usernames()?;
        let periods = periods.unwrap_or(self.report_periods);
        let rows = generate_report(&tickets, &usernames, cadence, periods, self.clock.now())?;
        Ok(rows.collect())
    }

    pub fn report_csv(
        &self,
        cadence: Cadence,
        periods: Option<usize>,
    ) -> Result<String, TicketServiceError> {
        let rows = self.report(cadence, periods)?;
        info!(
            cadence = cadence.label(),
            rows = rows.len(),
            "report generated"
        );
        Ok(to_csv_string(rows)?)
    }

    fn usernames(&self) -> Result<Usernames, TicketServiceError> {
        Ok(self
            .directory
            .profiles()?
            .into_iter()
            .map(|profile| (profile.user, profile.username))
            .collect())
    }

    fn dispatch_effects(&self, ticket: &Ticket, effect: TransitionEffect) {
        if !effect.closed_now {
            return;
        }

        let recipient = match self.directory.profile(ticket.reporter) {
            Ok(Some(profile)) => profile.email,
            Ok(None) => {
                warn!(
                    ticket = %ticket.id,
                    reporter = %ticket.reporter,
                    "closure notification skipped, reporter profile missing"
                );
                return;
            }
            Err(err) => {
                warn!(
                    ticket = %ticket.id,
                    error = %err,
                    "closure notification skipped, directory unavailable"
                );
                return;
            }
        };

        if let Err(err) = self
            .notifications
            .send(ClosureNotification::for_ticket(ticket, &recipient))
        {
            warn!(ticket = %ticket.id, error = %err, "closure notification failed");
        }
    }
}

fn ensure_reporter_access(profile: &Profile, ticket: &Ticket) -> Result<(), AuthorizationError> {
    if profile.is_agent || ticket.reporter == profile.user {
        Ok(())
    } else {
        Err(AuthorizationError::NotOwner {
            user: profile.user,
            ticket: ticket.id,
        })
    }
}

fn ticket_error(id: TicketId, err: RepositoryError) -> TicketServiceError {
    match err {
        RepositoryError::NotFound => TicketServiceError::TicketNotFound(id),
        other => TicketServiceError::Repository(other),
    }
}

/// Caller lacks the rights for the requested change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("only agents may change the {0} field")]
    AgentOnlyField(&'static str),
    #[error("user {user} does not own ticket {ticket}")]
    NotOwner { user: UserId, ticket: TicketId },
}

/// Error raised by the helpdesk service.
#[derive(Debug, thiserror::Error)]
pub enum TicketServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),
    #[error("profile for user {0} not found")]
    ProfileNotFound(UserId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Report(#[from] ReportError),
}
