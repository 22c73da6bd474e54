//! History domain model.

use crate::error::MtermError;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

const SUMMARY_LIMIT: usize = 200;

/// How an input line was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputKind {
    Builtin,
    Shell,
    NaturalLanguage,
    Chat,
}

/// Final state of one pass through the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
    /// A resource lock was held by another session
    Busy,
    /// Argument validation failed before anything ran
    Rejected,
    /// The interpreter could not resolve the request
    Uninterpretable,
    TimedOut,
    /// The user declined an interpreted mutating command
    Declined,
}

impl OutcomeStatus {
    pub fn from_error(err: &MtermError) -> Self {
        match err {
            MtermError::ResourceBusy { .. } => OutcomeStatus::Busy,
            MtermError::Validation(_) => OutcomeStatus::Rejected,
            MtermError::InterpretationFailure(_) => OutcomeStatus::Uninterpretable,
            MtermError::ExternalTimeout { .. } => OutcomeStatus::TimedOut,
            _ => OutcomeStatus::Failure,
        }
    }

    pub fn is_success(self) -> bool {
        self == OutcomeStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub summary: String,
}

impl Outcome {
    pub fn new(status: OutcomeStatus, text: &str) -> Self {
        Self {
            status,
            summary: summarize(text),
        }
    }

    pub fn success(text: &str) -> Self {
        Self::new(OutcomeStatus::Success, text)
    }

    pub fn from_error(err: &MtermError) -> Self {
        Self::new(OutcomeStatus::from_error(err), &err.to_string())
    }
}

/// First non-empty line of `text`, bounded in length.
fn summarize(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() <= SUMMARY_LIMIT {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(SUMMARY_LIMIT).collect();
    cut.push('…');
    cut
}

/// One persisted command/result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: SessionId,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: InputKind,
    pub raw_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_command: Option<String>,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// A history record before the store assigns its sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: InputKind,
    pub raw_input: String,
    pub resolved_command: Option<String>,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

impl NewHistoryEntry {
    pub fn into_entry(self, session_id: SessionId, sequence_number: u64) -> HistoryEntry {
        HistoryEntry {
            session_id,
            sequence_number,
            timestamp: self.timestamp,
            kind: self.kind,
            raw_input: self.raw_input,
            resolved_command: self.resolved_command,
            outcome: self.outcome,
            duration_ms: self.duration_ms,
        }
    }
}
