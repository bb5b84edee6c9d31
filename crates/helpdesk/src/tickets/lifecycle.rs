//! Ticket status transitions and rating rules.
//!
//! Timestamps are stamped on the first transition into a status and never
//! overwritten afterwards. Closed is terminal.

use chrono::{DateTime, Utc};

use super::domain::{Status, Ticket, ValidationError, MAX_RATING, MIN_RATING};

/// Side effects the caller must carry out once the mutation is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionEffect {
    pub started_now: bool,
    pub closed_now: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("ticket cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition { from: Status, to: Status },
    #[error("only closed tickets can be rated (ticket is {})", .status.label())]
    NotClosed { status: Status },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Apply a requested status to the ticket. `None` leaves the status unchanged.
pub fn transition(
    ticket: &mut Ticket,
    status: Option<Status>,
    now: DateTime<Utc>,
) -> Result<TransitionEffect, LifecycleError> {
    let Some(next) = status else {
        return Ok(TransitionEffect::default());
    };

    if ticket.status == Status::Closed && next != Status::Closed {
        return Err(LifecycleError::InvalidTransition {
            from: ticket.status,
            to: next,
        });
    }

    let mut effect = TransitionEffect::default();
    match next {
        Status::InDevelopment if ticket.time_in_development.is_none() => {
            ticket.time_in_development = Some(now.max(ticket.time_created));
            effect.started_now = true;
        }
        Status::Closed if ticket.time_closed.is_none() => {
            let floor = ticket.time_in_development.unwrap_or(ticket.time_created);
            ticket.time_closed = Some(now.max(floor));
            effect.closed_now = true;
        }
        _ => {}
    }
    ticket.status = next;

    Ok(effect)
}

/// Store a reporter's score. Re-rating overwrites the previous value.
pub fn rate(ticket: &mut Ticket, value: i64) -> Result<(), LifecycleError> {
    if ticket.status != Status::Closed {
        return Err(LifecycleError::NotClosed {
            status: ticket.status,
        });
    }

    let rating = u8::try_from(value)
        .ok()
        .filter(|rating| (MIN_RATING..=MAX_RATING).contains(rating))
        .ok_or(ValidationError::RatingOutOfRange(value))?;

    ticket.rating = Some(rating);
    Ok(())
}
