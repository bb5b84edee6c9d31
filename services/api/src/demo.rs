use crate::infra::{InMemoryHelpdeskStore, LoggingNotificationSink};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, ValueEnum};
use helpdesk::config::AppConfig;
use helpdesk::error::AppError;
use helpdesk::tickets::{
    AggregationResult, Cadence, Category, Clock, HelpdeskService, NewTicket, PeriodRow, Profile,
    StatisticsDashboard, Status, TicketUpdate, UserId,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

pub(crate) const DEFAULT_REPORTERS: usize = 20;
pub(crate) const DEFAULT_TICKETS_PER_REPORTER: usize = 3;
pub(crate) const DEFAULT_AGENTS_PER_EXPERTISE: usize = 2;

const REPORTER_ID_OFFSET: u64 = 1_000;
const HOURS_BETWEEN_TICKETS: i64 = 3;

type DemoService =
    HelpdeskService<InMemoryHelpdeskStore, InMemoryHelpdeskStore, LoggingNotificationSink>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of reporter accounts to create
    #[arg(long, default_value_t = DEFAULT_REPORTERS)]
    pub(crate) reporters: usize,
    /// Tickets filed by each reporter
    #[arg(long, default_value_t = DEFAULT_TICKETS_PER_REPORTER)]
    pub(crate) tickets_per_reporter: usize,
    /// Agents created for every expertise
    #[arg(long, default_value_t = DEFAULT_AGENTS_PER_EXPERTISE)]
    pub(crate) agents_per_expertise: usize,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            reporters: DEFAULT_REPORTERS,
            tickets_per_reporter: DEFAULT_TICKETS_PER_REPORTER,
            agents_per_expertise: DEFAULT_AGENTS_PER_EXPERTISE,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// Report cadence: daily, weekly or monthly
    #[arg(long, value_parser = crate::infra::parse_cadence)]
    pub(crate) timespan: Cadence,
    /// Number of periods to include (defaults to APP_REPORT_PERIODS)
    #[arg(long)]
    pub(crate) periods: Option<usize>,
    /// Output format: csv prints the export columns, json prints every computed column
    #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
    pub(crate) format: ReportFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ReportFormat {
    #[default]
    Csv,
    Json,
}

/// Agents for each expertise followed by reporter accounts.
pub(crate) fn seed_directory(agents_per_expertise: usize, reporters: usize) -> Vec<Profile> {
    let mut profiles = Vec::with_capacity(agents_per_expertise * 3 + reporters);
    let mut next_agent = 1u64;
    for expertise in Category::ordered() {
        for index in 1..=agents_per_expertise {
            let username = format!("agent_{}_{index}", expertise.label());
            profiles.push(Profile {
                user: UserId(next_agent),
                email: format!("{username}@helpdesk.local"),
                username,
                is_agent: true,
                expertise,
            });
            next_agent += 1;
        }
    }

    for index in 0..reporters {
        let username = format!("user_{index}");
        profiles.push(Profile {
            user: reporter_id(index),
            email: format!("{username}@helpdesk.local"),
            username,
            is_agent: false,
            expertise: Category::ordered()[index % 3],
        });
    }
    profiles
}

fn reporter_id(index: usize) -> UserId {
    UserId(REPORTER_ID_OFFSET + index as u64)
}

struct DemoClock {
    now: Mutex<DateTime<Utc>>,
}

impl DemoClock {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = at;
        }
    }
}

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|_| Utc::now())
    }
}

pub(crate) struct SeededHelpdesk {
    pub(crate) service: DemoService,
    pub(crate) notifications: Arc<LoggingNotificationSink>,
    pub(crate) tickets: usize,
}

/// Files tickets spread backward from `now` and walks a share of them through
/// development, closure and rating, always through the service.
pub(crate) fn seed_helpdesk(
    args: &DemoArgs,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<SeededHelpdesk, AppError> {
    let store = Arc::new(InMemoryHelpdeskStore::with_profiles(seed_directory(
        args.agents_per_expertise,
        args.reporters,
    )));
    let notifications = Arc::new(LoggingNotificationSink::new(
        config.notifications.sender.clone(),
    ));
    let clock = Arc::new(DemoClock::new(now));
    let service = HelpdeskService::new(store.clone(), store, notifications.clone())
        .with_clock(clock.clone())
        .with_report_periods(config.reports.default_periods);

    let total = args.reporters * args.tickets_per_reporter;
    let latest = now - Duration::minutes(1);
    let mut seeded = 0;
    for reporter in 0..args.reporters {
        for slot in 0..args.tickets_per_reporter {
            let sequence = reporter * args.tickets_per_reporter + slot;
            let created_at =
                now - Duration::hours(HOURS_BETWEEN_TICKETS * (total - sequence) as i64);
            let username = format!("user_{reporter}");

            clock.set(created_at);
            let ticket = service.create(
                reporter_id(reporter),
                NewTicket {
                    title: format!("Ticket {slot} of user {username}"),
                    description: format!("This is ticket {slot} of user {username}"),
                    category: Category::ordered()[(reporter + slot) % 3],
                },
            )?;
            seeded += 1;

            let Some(agent) = ticket.assignee else {
                continue;
            };
            let target = Status::ordered()[sequence % 3];
            if target == Status::Open {
                continue;
            }

            if sequence % 2 == 0 || target == Status::InDevelopment {
                clock.set((created_at + Duration::hours(1)).min(latest));
                service.update(agent, ticket.id, status_change(Status::InDevelopment))?;
            }
            if target == Status::Closed {
                let effort = Duration::hours(2 + (sequence % 5) as i64);
                clock.set((created_at + effort).min(latest));
                service.update(agent, ticket.id, status_change(Status::Closed))?;
                if sequence % 4 != 0 {
                    service.rate(reporter_id(reporter), ticket.id, (sequence % 5) as i64 + 1)?;
                }
            }
        }
    }
    clock.set(now);

    Ok(SeededHelpdesk {
        service,
        notifications,
        tickets: seeded,
    })
}

fn status_change(status: Status) -> TicketUpdate {
    TicketUpdate {
        status: Some(status),
        ..TicketUpdate::default()
    }
}

pub(crate) fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let seeded = seed_helpdesk(&DemoArgs::default(), &config, Utc::now())?;
    print!("{}", render_report(&seeded.service, &args)?);
    Ok(())
}

fn render_report(service: &DemoService, args: &ReportArgs) -> Result<String, AppError> {
    match args.format {
        ReportFormat::Csv => Ok(service.report_csv(args.timespan, args.periods)?),
        ReportFormat::Json => {
            let rows = service.report(args.timespan, args.periods)?;
            let payload = json!({ "timespan": args.timespan, "rows": rows });
            Ok(format!("{}\n", serde_json::to_string_pretty(&payload)?))
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let seeded = seed_helpdesk(&args, &config, Utc::now())?;

    println!("Helpdesk demo");
    println!(
        "- {} reporters | {} agents | {} tickets seeded",
        args.reporters,
        args.agents_per_expertise * 3,
        seeded.tickets
    );
    println!(
        "- {} closure notifications sent from {}",
        seeded.notifications.delivered().len(),
        config.notifications.sender
    );

    let dashboard = seeded.service.statistics()?;
    render_dashboard(&dashboard);

    println!(
        "\nDaily report (last {} periods)",
        config.reports.default_periods
    );
    let csv = seeded.service.report_csv(Cadence::Daily, None)?;
    print!("{csv}");

    let rows = seeded.service.report(Cadence::Daily, None)?;
    println!("\nPeriod details");
    for row in &rows {
        println!("{}", period_details(row));
    }

    Ok(())
}

/// Columns the CSV export leaves out.
fn period_details(row: &PeriodRow) -> String {
    let text = |value: Option<&str>| value.unwrap_or("-").to_string();
    format!(
        "- {}: {} open | top category {} | most resolved {} | fastest resolver {}",
        row.window.start.format("%Y-%m-%d"),
        row.open,
        text(row.most_common_category.map(|category| category.label())),
        text(row.most_resolved_agent.as_deref()),
        text(row.fastest_resolving_agent.as_deref())
    )
}

fn render_dashboard(dashboard: &StatisticsDashboard) {
    println!("\nStatistics");
    println!("- {} tickets tracked", dashboard.total_tickets);
    match &dashboard.response_time {
        Some(view) => println!(
            "- response time: avg {} | fastest {:.2}d | slowest {:.2}d ({} tickets)",
            view.average, view.min_days, view.max_days, view.count
        ),
        None => println!("- response time: no ticket has entered development"),
    }
    match &dashboard.resolution_time {
        Some(view) => println!(
            "- resolution time: avg {} | fastest {:.2}d | slowest {:.2}d ({} tickets)",
            view.average, view.min_days, view.max_days, view.count
        ),
        None => println!("- resolution time: no closed tickets"),
    }
    match dashboard.average_rating_closed {
        Some(rating) => println!("- average rating of closed tickets: {rating:.2}"),
        None => println!("- average rating of closed tickets: -"),
    }

    for aggregation in &dashboard.aggregations {
        match aggregation {
            AggregationResult::StatusBreakdown(entries) => {
                println!("Status breakdown:");
                for entry in entries {
                    println!("  - {}: {}", entry.status.label(), entry.total);
                }
            }
            AggregationResult::PerAgentBreakdown(entries) => {
                println!("Agents:");
                for entry in entries {
                    let name = entry.username.as_deref().unwrap_or("-");
                    println!(
                        "  - {name}: {} assigned | avg rating {:.2} over {} rated",
                        entry.assigned, entry.average_rating, entry.rated_tickets
                    );
                }
            }
            AggregationResult::CategoryBreakdown(entries) => {
                println!("Average resolution per category:");
                for entry in entries {
                    match entry.average_days {
                        Some(days) => println!(
                            "  - {}: {days:.2} days over {} tickets",
                            entry.category.label(),
                            entry.resolved
                        ),
                        None => println!("  - {}: -", entry.category.label()),
                    }
                }
            }
            AggregationResult::PerTicketSeries(entries) => {
                let resolved = entries
                    .iter()
                    .filter(|entry| entry.resolution_days.is_some())
                    .count();
                let total = entries.len();
                println!("Per-ticket series: {resolved} of {total} resolved");
            }
        }
    }
}
