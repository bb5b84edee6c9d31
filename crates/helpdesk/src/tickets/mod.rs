//! Support ticket lifecycle, agent assignment, statistics and period reports.
//!
//! Storage, profile lookup and outbound notifications are reached only
//! through the traits in [`repository`], so the service and router can be
//! exercised against in-memory fakes.

pub mod assignment;
pub mod domain;
pub mod lifecycle;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod statistics;

#[cfg(test)]
mod tests;

pub use assignment::{select_assignee, AgentCandidate, AssignmentEngine};
pub use domain::{
    Category, Expertise, NewTicket, Profile, Status, Ticket, TicketId, TicketUpdate, UserId,
    ValidationError,
};
pub use lifecycle::{LifecycleError, TransitionEffect};
pub use report::{
    generate_report, to_csv_string, write_csv, Cadence, PeriodRow, ReportError, ReportRows,
    ReportWindows, REPORT_HEADERS,
};
pub use repository::{
    ClosureNotification, NotificationError, NotificationSink, ProfileDirectory, RepositoryError,
    TicketFilter, TicketRepository,
};
pub use router::{ticket_router, ACTOR_HEADER};
pub use service::{AuthorizationError, Clock, HelpdeskService, SystemClock, TicketServiceError};
pub use statistics::{AggregationResult, StatisticsDashboard, TimeWindow, Usernames};
