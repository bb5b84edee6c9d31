//! Pure aggregations over a snapshot of tickets.
//!
//! Durations stay `chrono::Duration` through every aggregation and are only
//! turned into days or `d:h:m:s` text by the presentation helpers at the
//! bottom of this module.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::domain::{Category, Status, Ticket, TicketId, UserId};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Agent id to username lookup used when rendering per-agent results.
pub type Usernames = BTreeMap<UserId, String>;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    fn contains_opt(&self, at: Option<DateTime<Utc>>) -> bool {
        at.is_some_and(|at| self.contains(at))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSummary {
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    pub count: usize,
}

impl DurationSummary {
    /// `None` for an empty input; no zero is ever invented.
    pub fn from_durations(durations: impl IntoIterator<Item = Duration>) -> Option<Self> {
        let mut count = 0usize;
        let mut total_millis: i128 = 0;
        let mut min: Option<Duration> = None;
        let mut max: Option<Duration> = None;

        for duration in durations {
            count += 1;
            total_millis += i128::from(duration.num_milliseconds());
            min = Some(min.map_or(duration, |current| current.min(duration)));
            max = Some(max.map_or(duration, |current| current.max(duration)));
        }

        let (min, max) = (min?, max?);
        let average_millis = total_millis / count as i128;
        Some(Self {
            average: Duration::milliseconds(average_millis as i64),
            min,
            max,
            count,
        })
    }

    pub fn to_view(&self) -> DurationSummaryView {
        DurationSummaryView {
            average: format_duration(self.average),
            average_days: duration_in_days(self.average),
            min_days: duration_in_days(self.min),
            max_days: duration_in_days(self.max),
            count: self.count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationSummaryView {
    pub average: String,
    pub average_days: f64,
    pub min_days: f64,
    pub max_days: f64,
    pub count: usize,
}

/// Creation to in-development durations of tickets that reached development.
pub fn response_times(tickets: &[Ticket]) -> Option<DurationSummary> {
    DurationSummary::from_durations(tickets.iter().filter_map(Ticket::response_time))
}

/// Creation to closure durations of closed tickets.
pub fn resolution_times(tickets: &[Ticket]) -> Option<DurationSummary> {
    DurationSummary::from_durations(tickets.iter().filter_map(Ticket::resolution_time))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryResolution {
    pub category: Category,
    /// Fractional days; `None` when no ticket of the category was closed.
    pub average_days: Option<f64>,
    pub resolved: usize,
}

pub fn avg_resolution_per_category(tickets: &[Ticket]) -> Vec<CategoryResolution> {
    Category::ordered()
        .into_iter()
        .map(|category| {
            let summary = DurationSummary::from_durations(
                tickets
                    .iter()
                    .filter(|ticket| ticket.category == category)
                    .filter_map(Ticket::resolution_time),
            );
            CategoryResolution {
                category,
                average_days: summary.map(|summary| duration_in_days(summary.average)),
                resolved: summary.map_or(0, |summary| summary.count),
            }
        })
        .collect()
}

/// Mean rating over rated tickets, `None` without any rating.
pub fn average_rating(tickets: &[Ticket]) -> Option<f64> {
    mean(tickets.iter().filter_map(|ticket| ticket.rating))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssigneeRating {
    pub assignee: UserId,
    /// 0.0 when `rated_tickets` is zero.
    pub average: f64,
    pub rated_tickets: usize,
}

pub fn avg_rating_per_assignee(tickets: &[Ticket]) -> Vec<AssigneeRating> {
    let mut grouped: BTreeMap<UserId, Vec<u8>> = BTreeMap::new();
    for ticket in tickets {
        if let Some(assignee) = ticket.assignee {
            let ratings = grouped.entry(assignee).or_default();
            ratings.extend(ticket.rating);
        }
    }

    grouped
        .into_iter()
        .map(|(assignee, ratings)| AssigneeRating {
            assignee,
            average: mean(ratings.iter().copied()).unwrap_or(0.0),
            rated_tickets: ratings.len(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: Status,
    pub total: usize,
}

pub fn counts_by_status(tickets: &[Ticket]) -> Vec<StatusCount> {
    Status::ordered()
        .into_iter()
        .map(|status| StatusCount {
            status,
            total: tickets
                .iter()
                .filter(|ticket| ticket.status == status)
                .count(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub total: usize,
}

pub fn counts_by_category(tickets: &[Ticket]) -> Vec<CategoryCount> {
    Category::ordered()
        .into_iter()
        .map(|category| CategoryCount {
            category,
            total: tickets
                .iter()
                .filter(|ticket| ticket.category == category)
                .count(),
        })
        .collect()
}

pub fn counts_by_assignee(tickets: &[Ticket]) -> BTreeMap<UserId, usize> {
    let mut counts = BTreeMap::new();
    for assignee in tickets.iter().filter_map(|ticket| ticket.assignee) {
        *counts.entry(assignee).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketResolution {
    pub ticket: TicketId,
    pub category: Category,
    pub resolution_days: Option<f64>,
}

pub fn resolution_per_ticket(tickets: &[Ticket]) -> Vec<TicketResolution> {
    tickets
        .iter()
        .map(|ticket| TicketResolution {
            ticket: ticket.id,
            category: ticket.category,
            resolution_days: ticket.resolution_time().map(duration_in_days),
        })
        .collect()
}

/// Winner of a per-agent ranking within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTally {
    pub agent: UserId,
    pub tickets: usize,
    pub average_resolution: Option<Duration>,
}

/// Agent with the most tickets created in the window.
pub fn most_assigned_agent(tickets: &[Ticket], window: &TimeWindow) -> Option<AgentTally> {
    top_by_count(
        tickets
            .iter()
            .filter(|ticket| window.contains(ticket.time_created)),
    )
}

/// Agent who moved the most tickets into development within the window.
pub fn most_responded_agent(tickets: &[Ticket], window: &TimeWindow) -> Option<AgentTally> {
    top_by_count(
        tickets
            .iter()
            .filter(|ticket| window.contains_opt(ticket.time_in_development)),
    )
}

/// Agent who closed the most tickets within the window.
pub fn most_resolved_agent(tickets: &[Ticket], window: &TimeWindow) -> Option<AgentTally> {
    top_by_count(
        tickets
            .iter()
            .filter(|ticket| window.contains_opt(ticket.time_closed)),
    )
}

/// Agent with the lowest mean resolution time over tickets closed in the window.
pub fn fastest_resolving_agent(tickets: &[Ticket], window: &TimeWindow) -> Option<AgentTally> {
    let mut grouped: BTreeMap<UserId, Vec<Duration>> = BTreeMap::new();
    for ticket in tickets
        .iter()
        .filter(|ticket| window.contains_opt(ticket.time_closed))
    {
        if let (Some(agent), Some(resolution)) = (ticket.assignee, ticket.resolution_time()) {
            grouped.entry(agent).or_default().push(resolution);
        }
    }

    grouped
        .into_iter()
        .filter_map(|(agent, durations)| {
            DurationSummary::from_durations(durations).map(|summary| AgentTally {
                agent,
                tickets: summary.count,
                average_resolution: Some(summary.average),
            })
        })
        .min_by_key(|tally| (tally.average_resolution, tally.agent))
}

/// Most frequent category among tickets created in the window.
pub fn most_common_category(tickets: &[Ticket], window: &TimeWindow) -> Option<Category> {
    let created: Vec<Ticket> = tickets
        .iter()
        .filter(|ticket| window.contains(ticket.time_created))
        .cloned()
        .collect();

    counts_by_category(&created)
        .into_iter()
        .filter(|entry| entry.total > 0)
        .max_by(|a, b| a.total.cmp(&b.total).then(b.category.cmp(&a.category)))
        .map(|entry| entry.category)
}

fn top_by_count<'a>(tickets: impl Iterator<Item = &'a Ticket>) -> Option<AgentTally> {
    let mut counts: BTreeMap<UserId, usize> = BTreeMap::new();
    for agent in tickets.filter_map(|ticket| ticket.assignee) {
        *counts.entry(agent).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(agent_a, count_a), (agent_b, count_b)| {
            count_a.cmp(count_b).then(agent_b.cmp(agent_a))
        })
        .map(|(agent, tickets)| AgentTally {
            agent,
            tickets,
            average_resolution: None,
        })
}

fn mean(values: impl Iterator<Item = u8>) -> Option<f64> {
    let (sum, count) = values.fold((0u64, 0u64), |(sum, count), value| {
        (sum + u64::from(value), count + 1)
    });
    (count > 0).then(|| sum as f64 / count as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentBreakdownEntry {
    pub agent: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub assigned: usize,
    pub average_rating: f64,
    pub rated_tickets: usize,
}

/// Aggregate shapes handed to whatever renders charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum AggregationResult {
    CategoryBreakdown(Vec<CategoryResolution>),
    StatusBreakdown(Vec<StatusCount>),
    PerAgentBreakdown(Vec<AgentBreakdownEntry>),
    PerTicketSeries(Vec<TicketResolution>),
}

pub fn per_agent_breakdown(
    tickets: &[Ticket],
    usernames: &Usernames,
) -> Vec<AgentBreakdownEntry> {
    let assigned = counts_by_assignee(tickets);
    avg_rating_per_assignee(tickets)
        .into_iter()
        .map(|rating| AgentBreakdownEntry {
            agent: rating.assignee,
            username: usernames.get(&rating.assignee).cloned(),
            assigned: assigned.get(&rating.assignee).copied().unwrap_or(0),
            average_rating: rating.average,
            rated_tickets: rating.rated_tickets,
        })
        .collect()
}

/// Everything the statistics page shows, computed from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsDashboard {
    pub total_tickets: usize,
    pub response_time: Option<DurationSummaryView>,
    pub resolution_time: Option<DurationSummaryView>,
    pub average_rating_closed: Option<f64>,
    pub aggregations: Vec<AggregationResult>,
}

impl StatisticsDashboard {
    pub fn compute(tickets: &[Ticket], usernames: &Usernames) -> Self {
        let closed: Vec<Ticket> = tickets
            .iter()
            .filter(|ticket| ticket.status == Status::Closed)
            .cloned()
            .collect();

        Self {
            total_tickets: tickets.len(),
            response_time: response_times(tickets).map(|summary| summary.to_view()),
            resolution_time: resolution_times(&closed).map(|summary| summary.to_view()),
            average_rating_closed: average_rating(&closed),
            aggregations: vec![
                AggregationResult::StatusBreakdown(counts_by_status(tickets)),
                AggregationResult::PerAgentBreakdown(per_agent_breakdown(tickets, usernames)),
                AggregationResult::CategoryBreakdown(avg_resolution_per_category(tickets)),
                AggregationResult::PerTicketSeries(resolution_per_ticket(tickets)),
            ],
        }
    }
}

pub fn duration_in_days(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// `{days}d:{hours}h:{minutes}m:{seconds}s`, negative spans clamp to zero.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}d:{hours}h:{minutes}m:{seconds}s")
}
