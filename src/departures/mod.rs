//! Recipients of departures on one calendar day.
//!
//! The host database owns reservations and customers; this module only reads
//! them through [`DepartureSource`].

pub mod sqlite;

use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;
use thiserror::Error;

pub use sqlite::HostDatabase;

pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to acquire database lock: {0}")]
    Lock(String),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Half-open day window `[start, end)` in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartureWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DepartureWindow {
    /// The day `offset_days` before `now`, from midnight to the next midnight.
    /// `None` when that day is outside chrono's calendar.
    pub fn days_before(now: NaiveDateTime, offset_days: i64) -> Option<Self> {
        let start = now
            .checked_sub_signed(TimeDelta::try_days(offset_days)?)?
            .date()
            .and_time(NaiveTime::MIN);
        let end = start.checked_add_signed(TimeDelta::try_days(1)?)?;
        Some(Self { start, end })
    }

    pub fn departure_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn start_sql(&self) -> String {
        self.start.format(SQL_DATETIME_FORMAT).to_string()
    }

    pub fn end_sql(&self) -> String {
        self.end.format(SQL_DATETIME_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartureQuery {
    pub window: DepartureWindow,
    pub unit_categories: Vec<String>,
    pub customer_types: Vec<String>,
}

/// One customer departing inside the window, as read from the host database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientRow {
    pub name: String,
    pub salutation: String,
    pub email: String,
    /// Raw country code of the customer, mapped to a language later.
    pub country_code: Option<String>,
}

pub trait DepartureSource: Send + Sync {
    fn fetch_recipients(
        &self,
        query: &DepartureQuery,
    ) -> impl Future<Output = Result<Vec<RecipientRow>, SourceError>> + Send;
}
