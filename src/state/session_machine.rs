//! Lifecycle rules of a live game session.
//!
//! `lobby --start--> in_progress --end--> completed`, nothing leaves
//! `completed`. Players may only join the lobby and only answer while the
//! game is in progress.

use std::time::SystemTime;

use thiserror::Error;

use crate::dao::models::{SessionStatus, SessionTransition};

/// Host-issued events that move a session to its next status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the game from the lobby.
    Start,
    /// Host ends a running game.
    End,
}

/// Player activities gated on the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionActivity {
    /// Entering the session as a new player.
    Join,
    /// Submitting an answer to a question.
    Answer,
    /// Posting a chat line.
    Chat,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {event} a session that is {from}")]
pub struct InvalidTransition {
    /// Status the session was in.
    pub from: SessionStatus,
    /// Rejected event.
    pub event: SessionEvent,
}

/// Error returned when an activity is not legal in the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {activity} while the session is {status}")]
pub struct ActivityNotPermitted {
    /// Status the session was in.
    pub status: SessionStatus,
    /// Rejected activity.
    pub activity: SessionActivity,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionEvent::Start => "start",
            SessionEvent::End => "end",
        })
    }
}

impl std::fmt::Display for SessionActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionActivity::Join => "join",
            SessionActivity::Answer => "submit answers",
            SessionActivity::Chat => "chat",
        })
    }
}

/// Status reached by applying `event` from `from`.
pub fn compute_transition(
    from: SessionStatus,
    event: SessionEvent,
) -> Result<SessionStatus, InvalidTransition> {
    match (from, event) {
        (SessionStatus::Lobby, SessionEvent::Start) => Ok(SessionStatus::InProgress),
        (SessionStatus::InProgress, SessionEvent::End) => Ok(SessionStatus::Completed),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}

/// Build the compare-and-swap handed to storage for `event`.
pub fn plan_transition(
    from: SessionStatus,
    event: SessionEvent,
    at: SystemTime,
) -> Result<SessionTransition, InvalidTransition> {
    let to = compute_transition(from, event)?;
    Ok(SessionTransition { from, to, at })
}

/// Check that `activity` is legal while the session is in `status`.
pub fn ensure_permitted(
    status: SessionStatus,
    activity: SessionActivity,
) -> Result<(), ActivityNotPermitted> {
    let allowed = match activity {
        SessionActivity::Join => status == SessionStatus::Lobby,
        SessionActivity::Answer => status == SessionStatus::InProgress,
        SessionActivity::Chat => status != SessionStatus::Completed,
    };
    if allowed {
        Ok(())
    } else {
        Err(ActivityNotPermitted { status, activity })
    }
}
