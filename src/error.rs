// src/error.rs

use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Which presence check a render was waiting on when it timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// The table container itself.
    Table,
    /// At least one row inside the table.
    Row,
}

impl std::fmt::Display for WaitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitStage::Table => f.write_str("table"),
            WaitStage::Row => f.write_str("table row"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HarvestError {
    /// The data table never appeared within the wait budget.
    #[error("{stage} for {date} did not render within {timeout:?}")]
    RenderTimeout {
        date: NaiveDate,
        stage: WaitStage,
        timeout: Duration,
    },

    /// The page rendered but held no bond-details table.
    #[error("table not found for date {date}")]
    TableNotFound { date: NaiveDate },

    /// No date in the whole range produced a table.
    #[error("no records collected; refusing to write output")]
    EmptyResult,

    /// Too many renders in a row timed out; the harvest was abandoned.
    #[error("aborting at {date} after {consecutive} consecutive render timeouts")]
    TimeoutThreshold { date: NaiveDate, consecutive: u32 },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvestError {
    pub fn browser(msg: impl Into<String>) -> Self {
        HarvestError::Browser(msg.into())
    }
}
