//! Periodic rollups walking backward from a reference instant.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::io::Write;
use std::str::FromStr;

use super::domain::{Category, Status, Ticket, UserId, ValidationError};
use super::statistics::{
    average_rating, fastest_resolving_agent, format_duration, most_assigned_agent,
    most_common_category, most_resolved_agent, most_responded_agent, resolution_times,
    response_times, AgentTally, TimeWindow, Usernames,
};

pub const DEFAULT_PERIODS: usize = 3;

pub const REPORT_HEADERS: [&str; 9] = [
    "Timespan (Start Date)",
    "Total Tickets",
    "Total Tickets In Development",
    "Total Tickets Closed",
    "Avg Response Time",
    "Avg Resolution Time",
    "Avg Rating",
    "Most Assigned Agent",
    "Most Responded Agent",
];

const EMPTY_CELL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Start of the window that ends at `end`.
    fn window_start(self, end: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => end.checked_sub_signed(Duration::days(1)),
            Self::Weekly => end.checked_sub_signed(Duration::weeks(1)),
            Self::Monthly => end.checked_sub_months(Months::new(1)),
        }
    }
}

impl FromStr for Cadence {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(ValidationError::UnknownCadence(value.to_string())),
        }
    }
}

/// Contiguous windows, most recent first. Finite and not restartable.
#[derive(Debug, Clone)]
pub struct ReportWindows {
    cadence: Cadence,
    cursor: DateTime<Utc>,
    remaining: usize,
}

impl ReportWindows {
    pub fn new(cadence: Cadence, now: DateTime<Utc>, periods: usize) -> Self {
        Self {
            cadence,
            cursor: now,
            remaining: periods,
        }
    }
}

impl Iterator for ReportWindows {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let Some(start) = self.cadence.window_start(self.cursor) else {
            self.remaining = 0;
            return None;
        };

        let window = TimeWindow::new(start, self.cursor);
        self.cursor = start;
        self.remaining -= 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// One line of the period report.
///
/// The CSV export carries the first nine columns; the JSON form carries all of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    /// 1 for the most recent window.
    pub period: usize,
    pub window: TimeWindow,
    pub total_tickets: usize,
    pub in_development: usize,
    pub closed: usize,
    /// Derived as created minus closed minus in development, so it can go
    /// negative when a transition falls in a different window than creation.
    pub open: i64,
    pub most_common_category: Option<Category>,
    #[serde(serialize_with = "serialize_duration")]
    pub avg_response: Option<Duration>,
    #[serde(serialize_with = "serialize_duration")]
    pub avg_resolution: Option<Duration>,
    pub avg_rating: Option<f64>,
    pub most_assigned_agent: Option<String>,
    pub most_responded_agent: Option<String>,
    pub most_resolved_agent: Option<String>,
    pub fastest_resolving_agent: Option<String>,
}

impl PeriodRow {
    pub fn compute(
        period: usize,
        window: TimeWindow,
        tickets: &[Ticket],
        usernames: &Usernames,
    ) -> Self {
        let created: Vec<Ticket> = tickets
            .iter()
            .filter(|ticket| window.contains(ticket.time_created))
            .cloned()
            .collect();
        let closed_in_window: Vec<Ticket> = tickets
            .iter()
            .filter(|ticket| ticket.time_closed.is_some_and(|at| window.contains(at)))
            .cloned()
            .collect();

        let in_development = tickets
            .iter()
            .filter(|ticket| {
                ticket.status == Status::InDevelopment
                    && ticket
                        .time_in_development
                        .is_some_and(|at| window.contains(at))
            })
            .count();
        let closed = closed_in_window
            .iter()
            .filter(|ticket| ticket.status == Status::Closed)
            .count();
        let total_tickets = created.len();

        let agent_name = |tally: Option<AgentTally>| {
            tally.and_then(|tally| display_agent(tally.agent, usernames))
        };

        Self {
            period,
            window,
            total_tickets,
            in_development,
            closed,
            open: total_tickets as i64 - closed as i64 - in_development as i64,
            most_common_category: most_common_category(tickets, &window),
            avg_response: response_times(&created).map(|summary| summary.average),
            avg_resolution: resolution_times(&closed_in_window).map(|summary| summary.average),
            avg_rating: average_rating(&closed_in_window),
            most_assigned_agent: agent_name(most_assigned_agent(tickets, &window)),
            most_responded_agent: agent_name(most_responded_agent(tickets, &window)),
            most_resolved_agent: agent_name(most_resolved_agent(tickets, &window)),
            fastest_resolving_agent: agent_name(fastest_resolving_agent(tickets, &window)),
        }
    }

    /// Cells in `REPORT_HEADERS` order.
    pub fn to_record(&self) -> [String; 9] {
        [
            self.window.start.format("%Y-%m-%d").to_string(),
            self.total_tickets.to_string(),
            self.in_development.to_string(),
            self.closed.to_string(),
            duration_cell(self.avg_response),
            duration_cell(self.avg_resolution),
            self.avg_rating
                .map_or_else(|| EMPTY_CELL.to_string(), |rating| format!("{rating:.2}")),
            text_cell(self.most_assigned_agent.as_deref()),
            text_cell(self.most_responded_agent.as_deref()),
        ]
    }
}

/// Unknown agents render as an empty cell rather than a made-up name.
fn display_agent(agent: UserId, usernames: &Usernames) -> Option<String> {
    usernames.get(&agent).cloned()
}

fn serialize_duration<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.map(format_duration).serialize(serializer)
}

fn duration_cell(duration: Option<Duration>) -> String {
    duration.map_or_else(|| EMPTY_CELL.to_string(), format_duration)
}

fn text_cell(value: Option<&str>) -> String {
    value.unwrap_or(EMPTY_CELL).to_string()
}

/// Lazily computed report rows over a ticket snapshot.
pub struct ReportRows<'a> {
    windows: ReportWindows,
    tickets: &'a [Ticket],
    usernames: &'a Usernames,
    period: usize,
}

impl Iterator for ReportRows<'_> {
    type Item = PeriodRow;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.windows.next()?;
        self.period += 1;
        Some(PeriodRow::compute(
            self.period,
            window,
            self.tickets,
            self.usernames,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.windows.size_hint()
    }
}

pub fn generate_report<'a>(
    tickets: &'a [Ticket],
    usernames: &'a Usernames,
    cadence: Cadence,
    periods: usize,
    now: DateTime<Utc>,
) -> Result<ReportRows<'a>, ValidationError> {
    if periods == 0 {
        return Err(ValidationError::NoPeriods);
    }

    Ok(ReportRows {
        windows: ReportWindows::new(cadence, now, periods),
        tickets,
        usernames,
        period: 0,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush report: {0}")]
    Io(#[from] std::io::Error),
    #[error("report is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Header plus one record per row. Returns the number of data rows written.
pub fn write_csv<W, I>(writer: W, rows: I) -> Result<usize, ReportError>
where
    W: Write,
    I: IntoIterator<Item = PeriodRow>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(REPORT_HEADERS)?;

    let mut written = 0;
    for row in rows {
        csv_writer.write_record(row.to_record())?;
        written += 1;
    }
    csv_writer.flush()?;

    Ok(written)
}

pub fn to_csv_string<I>(rows: I) -> Result<String, ReportError>
where
    I: IntoIterator<Item = PeriodRow>,
{
    let mut buffer = Vec::new();
    write_csv(&mut buffer, rows)?;
    Ok(String::from_utf8(buffer)?)
}
