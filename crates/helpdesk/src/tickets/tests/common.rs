use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::tickets::assignment::AgentCandidate;
use crate::tickets::domain::{
    Category, Expertise, NewTicket, Profile, Status, Ticket, TicketId, UserId,
};
use crate::tickets::repository::{
    ClosureNotification, NotificationError, NotificationSink, ProfileDirectory, RepositoryError,
    TicketFilter, TicketRepository,
};
use crate::tickets::service::{Clock, HelpdeskService};

pub(super) const REPORTER: UserId = UserId(10);
pub(super) const OTHER_REPORTER: UserId = UserId(11);
pub(super) const TECH_AGENT_A: UserId = UserId(1);
pub(super) const TECH_AGENT_B: UserId = UserId(2);
pub(super) const TECH_AGENT_C: UserId = UserId(3);
pub(super) const BUSINESS_AGENT: UserId = UserId(4);

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 15, 9, 0, 0).unwrap()
}

pub(super) fn profile(
    user: UserId,
    username: &str,
    is_agent: bool,
    expertise: Expertise,
) -> Profile {
    Profile {
        user,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        is_agent,
        expertise,
    }
}

pub(super) fn default_profiles() -> Vec<Profile> {
    vec![
        profile(REPORTER, "reporter_rita", false, Category::Technical),
        profile(OTHER_REPORTER, "reporter_otto", false, Category::Business),
        profile(TECH_AGENT_A, "agent_ada", true, Category::Technical),
        profile(TECH_AGENT_B, "agent_bo", true, Category::Technical),
        profile(TECH_AGENT_C, "agent_cy", true, Category::Technical),
        profile(BUSINESS_AGENT, "agent_dee", true, Category::Business),
    ]
}

pub(super) fn submission(category: Category) -> NewTicket {
    NewTicket {
        title: format!("{} issue", category.label()),
        description: "Something stopped working after the update".to_string(),
        category,
    }
}

/// Ticket fixture inserted directly into the store, bypassing the service.
pub(super) fn seeded_ticket(id: u64, assignee: Option<UserId>, status: Status) -> Ticket {
    let mut ticket = Ticket::open(
        TicketId(id),
        submission(Category::Technical),
        OTHER_REPORTER,
        start() - Duration::days(30),
    );
    ticket.assignee = assignee;
    ticket.status = status;
    if status == Status::Closed {
        ticket.time_closed = Some(ticket.time_created + Duration::hours(5));
    }
    ticket
}

pub(super) type TestService = HelpdeskService<MemoryStore, MemoryStore, MemoryNotifications>;

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryStore>,
    Arc<MemoryNotifications>,
    Arc<FixedClock>,
) {
    let store = Arc::new(MemoryStore::with_profiles(default_profiles()));
    let notifications = Arc::new(MemoryNotifications::default());
    let clock = Arc::new(FixedClock::at(start()));
    let service = HelpdeskService::new(store.clone(), store.clone(), notifications.clone())
        .with_clock(clock.clone());
    (service, store, notifications, clock)
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    tickets: Arc<Mutex<BTreeMap<TicketId, Ticket>>>,
    profiles: Arc<Mutex<BTreeMap<UserId, Profile>>>,
}

impl MemoryStore {
    pub(super) fn with_profiles(profiles: Vec<Profile>) -> Self {
        let store = Self::default();
        {
            let mut guard = store.profiles.lock().expect("profile mutex poisoned");
            for profile in profiles {
                guard.insert(profile.user, profile);
            }
        }
        store
    }

    pub(super) fn seed(&self, ticket: Ticket) {
        self.tickets
            .lock()
            .expect("ticket mutex poisoned")
            .insert(ticket.id, ticket);
    }

    pub(super) fn stored(&self, id: TicketId) -> Option<Ticket> {
        self.tickets
            .lock()
            .expect("ticket mutex poisoned")
            .get(&id)
            .cloned()
    }
}

impl TicketRepository for MemoryStore {
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
        let mut working = stored.clone();
        let outcome = apply(&mut working);
        if outcome.is_ok() {
            *stored = working;
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
        Ok(guard
            .values()
            .filter(|ticket| filter.matches(ticket))
            .cloned()
            .collect())
    }
}

impl ProfileDirectory for MemoryStore {
    fn profile(&self, user: UserId) -> Result<Option<Profile>, RepositoryError> {
        let guard = self.profiles.lock().expect("profile mutex poisoned");
        Ok(guard.get(&user).cloned())
    }

    fn profiles(&self) -> Result<Vec<Profile>, RepositoryError> {
        let guard = self.profiles.lock().expect("profile mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn agent_candidates(
        &self,
        expertise: Expertise,
    ) -> Result<Vec<AgentCandidate>, RepositoryError> {
        let profiles = self.profiles.lock().expect("profile mutex poisoned");
        let tickets = self.tickets.lock().expect("ticket mutex poisoned");
        Ok(profiles
            .values()
            .filter(|profile| profile.is_agent && profile.expertise == expertise)
            .map(|profile| {
                let workload = tickets
                    .values()
                    .filter(|ticket| ticket.is_active())
                    .filter(|ticket| ticket.assignee == Some(profile.user))
                    .count();
                AgentCandidate {
                    agent: profile.user,
                    username: profile.username.clone(),
                    workload,
                }
            })
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<ClosureNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<ClosureNotification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSink for MemoryNotifications {
    fn send(&self, notification: ClosureNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationSink for FailingNotifications {
    fn send(&self, _notification: ClosureNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl TicketRepository for UnavailableStore {
    fn insert(&self, _ticket: Ticket) -> Result<Ticket, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_with<T, E, F>(
        &self,
        _id: TicketId,
        _apply: F,
    ) -> Result<Result<T, E>, RepositoryError>
    where
        F: FnOnce(&mut Ticket) -> Result<T, E>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: TicketId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn snapshot(&self, _filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Clock pinned to a test-controlled instant.
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}
