use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entities::{
        transfer_request::{self, Column as TransferColumn},
        Location, TransferStatus,
    },
    errors::ServiceError,
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Approved,
    Sent,
    /// Requests that reached `received`
    Completed,
    Rejected,
}

impl StatusFilter {
    pub fn status(self) -> Option<TransferStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Pending => Some(TransferStatus::Pending),
            StatusFilter::Approved => Some(TransferStatus::Approved),
            StatusFilter::Sent => Some(TransferStatus::Sent),
            StatusFilter::Completed => Some(TransferStatus::Received),
            StatusFilter::Rejected => Some(TransferStatus::Rejected),
        }
    }

    /// Which timestamp periods and ordering apply to.
    pub fn date_field(self) -> DateField {
        match self {
            StatusFilter::All | StatusFilter::Pending => DateField::CreatedAt,
            StatusFilter::Approved => DateField::ApprovedAt,
            StatusFilter::Sent => DateField::SentAt,
            StatusFilter::Completed => DateField::ReceivedAt,
            StatusFilter::Rejected => DateField::RejectedAt,
        }
    }

    pub fn matches(self, request: &transfer_request::Model) -> bool {
        self.status().map_or(true, |status| request.status == status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    CreatedAt,
    ApprovedAt,
    SentAt,
    ReceivedAt,
    RejectedAt,
}

impl DateField {
    pub fn column(self) -> TransferColumn {
        match self {
            DateField::CreatedAt => TransferColumn::CreatedAt,
            DateField::ApprovedAt => TransferColumn::ApprovedAt,
            DateField::SentAt => TransferColumn::SentAt,
            DateField::ReceivedAt => TransferColumn::ReceivedAt,
            DateField::RejectedAt => TransferColumn::RejectedAt,
        }
    }

    pub fn value(self, request: &transfer_request::Model) -> Option<DateTime<Utc>> {
        match self {
            DateField::CreatedAt => Some(request.created_at),
            DateField::ApprovedAt => request.approved_at,
            DateField::SentAt => request.sent_at,
            DateField::ReceivedAt => request.received_at,
            DateField::RejectedAt => request.rejected_at,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Direction {
    Incoming,
    Outgoing,
    #[default]
    Both,
}

impl Direction {
    pub fn matches(self, request: &transfer_request::Model, location: Location) -> bool {
        match self {
            Direction::Incoming => request.to_location == location,
            Direction::Outgoing => request.from_location == location,
            Direction::Both => request.to_location == location || request.from_location == location,
        }
    }
}

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    AllTime,
    Today,
    /// Monday through Sunday
    ThisWeek,
    ThisMonth,
    ThisYear,
    /// Inclusive on both dates
    Custom { from: NaiveDate, to: NaiveDate },
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl Period {
    /// Builds a period from its query-string name and optional bounds.
    pub fn parse(
        name: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, ServiceError> {
        let period = match name.trim().to_ascii_lowercase().as_str() {
            "" | "all_time" => Period::AllTime,
            "today" => Period::Today,
            "this_week" => Period::ThisWeek,
            "this_month" => Period::ThisMonth,
            "this_year" => Period::ThisYear,
            "custom" => match (from, to) {
                (Some(from), Some(to)) => Period::Custom { from, to },
                _ => {
                    return Err(ServiceError::ValidationError(
                        "Custom period requires both from and to dates".to_string(),
                    ))
                }
            },
            other => {
                return Err(ServiceError::ValidationError(format!(
                    "Unknown period: {}",
                    other
                )))
            }
        };

        if let Period::Custom { from, to } = period {
            if from > to {
                return Err(ServiceError::ValidationError(format!(
                    "Period start {} is after end {}",
                    from, to
                )));
            }
        }
        Ok(period)
    }

    /// The interval this period covers relative to `now`; `None` is unbounded.
    pub fn range(&self, now: DateTime<Utc>) -> Option<DateRange> {
        let today = now.date_naive();
        let (start, end) = match *self {
            Period::AllTime => return None,
            Period::Today => (today, today.succ_opt()?),
            Period::ThisWeek => {
                let start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (start, start + Duration::days(7))
            }
            Period::ThisMonth => {
                let start = today.with_day(1)?;
                let end = if start.month() == 12 {
                    NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)?
                };
                (start, end)
            }
            Period::ThisYear => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?,
            ),
            Period::Custom { from, to } => (from, to.succ_opt()?),
        };
        Some(DateRange {
            start: midnight(start),
            end: midnight(end),
        })
    }
}

/// Listing criteria relative to one location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFilter {
    pub status: StatusFilter,
    pub direction: Direction,
    pub search: Option<String>,
    pub period: Period,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl TransferFilter {
    /// Trimmed, lowercased search text; blank input means no search.
    pub fn search_text(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// In-memory form of the database query the store runs, pagination aside.
    pub fn matches(
        &self,
        request: &transfer_request::Model,
        location: Location,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.status.matches(request) || !self.direction.matches(request, location) {
            return false;
        }

        if let Some(range) = self.period.range(now) {
            match self.status.date_field().value(request) {
                Some(at) if range.contains(at) => {}
                _ => return false,
            }
        }

        match self.search_text() {
            Some(needle) => {
                request.part_number.to_lowercase().contains(&needle)
                    || request.display_name.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}
