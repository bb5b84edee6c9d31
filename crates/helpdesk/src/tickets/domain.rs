use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_TITLE_LEN: usize = 100;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Identifier wrapper for tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for users, agents and reporters alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in development")]
    InDevelopment,
    #[serde(rename = "closed")]
    Closed,
}

impl Status {
    pub const fn ordered() -> [Self; 3] {
        [Self::Open, Self::InDevelopment, Self::Closed]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InDevelopment => "in development",
            Self::Closed => "closed",
        }
    }

    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Ticket category, doubling as the expertise an agent is eligible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technical,
    Business,
    Financial,
}

impl Category {
    pub const fn ordered() -> [Self; 3] {
        [Self::Technical, Self::Business, Self::Financial]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Business => "business",
            Self::Financial => "financial",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "technical" | "tech" => Ok(Self::Technical),
            "business" => Ok(Self::Business),
            "financial" => Ok(Self::Financial),
            _ => Err(ValidationError::UnknownCategory(value.to_string())),
        }
    }
}

pub type Expertise = Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub category: Category,
    pub reporter: UserId,
    pub assignee: Option<UserId>,
    pub time_created: DateTime<Utc>,
    pub time_in_development: Option<DateTime<Utc>>,
    pub time_closed: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
}

impl Ticket {
    pub fn open(
        id: TicketId,
        submission: NewTicket,
        reporter: UserId,
        time_created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: submission.title,
            description: submission.description,
            status: Status::Open,
            category: submission.category,
            reporter,
            assignee: None,
            time_created,
            time_in_development: None,
            time_closed: None,
            rating: None,
        }
    }

    /// Time from creation until work started, when the ticket got that far.
    pub fn response_time(&self) -> Option<chrono::Duration> {
        self.time_in_development
            .map(|started| started - self.time_created)
    }

    /// Time from creation until closure.
    pub fn resolution_time(&self) -> Option<chrono::Duration> {
        self.time_closed.map(|closed| closed - self.time_created)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Per-user profile distinguishing agents from reporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user: UserId,
    pub username: String,
    pub email: String,
    pub is_agent: bool,
    pub expertise: Expertise,
}

/// Fields a reporter supplies when filing a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: Category,
}

impl NewTicket {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TooLong {
                field: "title",
                max: MAX_TITLE_LEN,
            });
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        Ok(())
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub assignee: Option<UserId>,
}

impl TicketUpdate {
    pub fn touches_agent_fields(&self) -> bool {
        self.status.is_some() || self.assignee.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(ValidationError::MissingField("title"));
            }
            if title.chars().count() > MAX_TITLE_LEN {
                return Err(ValidationError::TooLong {
                    field: "title",
                    max: MAX_TITLE_LEN,
                });
            }
        }
        if matches!(&self.description, Some(description) if description.trim().is_empty()) {
            return Err(ValidationError::MissingField("description"));
        }
        Ok(())
    }
}

/// Malformed caller input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i64),
    #[error("unknown report timespan '{0}', expected daily, weekly or monthly")]
    UnknownCadence(String),
    #[error("unknown category '{0}', expected technical, business or financial")]
    UnknownCategory(String),
    #[error("report periods must be at least 1")]
    NoPeriods,
    #[error("user {0} is not an agent and cannot be assigned tickets")]
    NotAnAgent(UserId),
}
