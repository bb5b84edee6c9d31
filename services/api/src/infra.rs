use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use helpdesk::tickets::{
    AgentCandidate, Cadence, ClosureNotification, Expertise, NotificationError, NotificationSink,
    Profile, ProfileDirectory, RepositoryError, Ticket, TicketFilter, TicketId, TicketRepository,
    UserId,
};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local ticket store and profile directory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryHelpdeskStore {
    tickets: Arc<Mutex<HashMap<TicketId, Ticket>>>,
    profiles: Arc<Mutex<HashMap<UserId, Profile>>>,
}

impl InMemoryHelpdeskStore {
    pub(crate) fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let store = Self::default();
        {
            let mut guard = store.profiles.lock().expect("profile mutex poisoned");
            guard.extend(profiles.into_iter().map(|profile| (profile.user, profile)));
        }
        store
    }
}

impl TicketRepository for InMemoryHelpdeskStore {
    fn insert(&self, ticket: Ticket) -> Result<Ticket, RepositoryError> {
        let mut guard = self.tickets.lock().expect("ticket mutex poisoned");
        if guard.contains_key(&ticket.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    fn fetch(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let guard = self.tickets.lock().expect("ticket mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn update_with<T, E, F>(&self, id: TicketId, apply: F) -> Result<Result<T, E>, RepositoryError>
    where
        F: FnOnce(&mut Ticket) -> Result<T, E>,
    {
        let mut guard = self.tickets.lock().expect("ticket mutex poisoned");
        let stored = guard.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let mut draft = stored.clone();
        let outcome = apply(&mut draft);
        if outcome.is_ok() {
            *stored = draft;
        }
        Ok(outcome)
    }

    fn delete(&self, id: TicketId) -> Result<(), RepositoryError> {
        let mut guard = self.tickets.lock().expect("ticket mutex poisoned");
        match guard.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound),
        }
    }

    fn snapshot(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError> {
        let guard = self.tickets.lock().expect("ticket mutex poisoned");
        let mut tickets: Vec<Ticket> = guard
            .values()
            .filter(|ticket| filter.matches(ticket))
            .cloned()
            .collect();
        tickets.sort_by_key(|ticket| ticket.id);
        Ok(tickets)
    }
}

impl ProfileDirectory for InMemoryHelpdeskStore {
    fn profile(&self, user: UserId) -> Result<Option<Profile>, RepositoryError> {
        let guard = self.profiles.lock().expect("profile mutex poisoned");
        Ok(guard.get(&user).cloned())
    }

    fn profiles(&self) -> Result<Vec<Profile>, RepositoryError> {
        let guard = self.profiles.lock().expect("profile mutex poisoned");
        let mut profiles: Vec<Profile> = guard.values().cloned().collect();
        profiles.sort_by_key(|profile| profile.user);
        Ok(profiles)
    }

    fn agent_candidates(
        &self,
        expertise: Expertise,
    ) -> Result<Vec<AgentCandidate>, RepositoryError> {
        let profiles = self.profiles.lock().expect("profile mutex poisoned");
        let tickets = self.tickets.lock().expect("ticket mutex poisoned");

        let mut workloads: HashMap<UserId, usize> = HashMap::new();
        for ticket in tickets.values().filter(|ticket| ticket.is_active()) {
            if let Some(agent) = ticket.assignee {
                *workloads.entry(agent).or_insert(0) += 1;
            }
        }

        Ok(profiles
            .values()
            .filter(|profile| profile.is_agent && profile.expertise == expertise)
            .map(|profile| AgentCandidate {
                agent: profile.user,
                username: profile.username.clone(),
                workload: workloads.get(&profile.user).copied().unwrap_or(0),
            })
            .collect())
    }
}

/// Records closure notices and logs them in place of an SMTP relay.
#[derive(Clone)]
pub(crate) struct LoggingNotificationSink {
    sender: String,
    delivered: Arc<Mutex<Vec<ClosureNotification>>>,
}

impl LoggingNotificationSink {
    pub(crate) fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn delivered(&self) -> Vec<ClosureNotification> {
        self.delivered
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSink for LoggingNotificationSink {
    fn send(&self, notification: ClosureNotification) -> Result<(), NotificationError> {
        info!(
            from = %self.sender,
            to = %notification.recipient,
            subject = %notification.subject,
            "closure notification sent"
        );
        let mut guard = self
            .delivered
            .lock()
            .map_err(|_| NotificationError::Transport("outbox unavailable".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

pub(crate) fn parse_cadence(raw: &str) -> Result<Cadence, String> {
    raw.parse::<Cadence>().map_err(|err| err.to_string())
}
