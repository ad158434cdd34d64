//! Common types shared by the form workflow, sheet backends and workers

use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix written into the Logs column for a submitted row. Rows whose log
/// starts with it are never submitted again.
pub const SUCCESS_MARKER: &str = "✅";

/// Timestamp format used for the TimeStamp column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One data row of a worker sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// 1-based spreadsheet row; the header occupies row 1
    pub row_index: usize,
    pub imei: String,
    pub status: String,
    pub location: String,
    pub logs: String,
    pub timestamp: String,
}

impl Row {
    /// Position among the data rows, counting the first row under the header as 1
    pub fn data_row(&self) -> usize {
        self.row_index.saturating_sub(1)
    }

    /// Has an IMEI and has not been submitted successfully yet
    pub fn is_pending(&self) -> bool {
        !self.imei.trim().is_empty() && !self.logs.starts_with(SUCCESS_MARKER)
    }
}

/// Stock status accepted by the form's status select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ready,
    Broken,
}

impl Status {
    /// Value attribute of the matching `<option>`
    pub fn option_value(&self) -> &'static str {
        match self {
            Status::Ready => "READY",
            Status::Broken => "BROKEN",
        }
    }
}

impl FromStr for Status {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "READY" => Ok(Status::Ready),
            "BROKEN" => Ok(Status::Broken),
            _ => Err(AutomationError::UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_value())
    }
}

/// Knack login read from the worker sheet
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl Account {
    pub fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

// Never print the password
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Result of submitting one row, as written back into the Logs column
#[derive(Debug)]
pub enum RowOutcome {
    Submitted,
    Failed(AutomationError),
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Submitted)
    }

    pub fn log_message(&self) -> String {
        match self {
            RowOutcome::Submitted => format!("{SUCCESS_MARKER} Submitted"),
            RowOutcome::Failed(e) => format!("❌ Error: {} - {}", e.kind(), e),
        }
    }
}

impl From<Result<(), AutomationError>> for RowOutcome {
    fn from(result: Result<(), AutomationError>) -> Self {
        match result {
            Ok(()) => RowOutcome::Submitted,
            Err(e) => RowOutcome::Failed(e),
        }
    }
}
