use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Location;

/// Lifecycle status of a transfer request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransferStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl TransferStatus {
    /// `received` and `rejected` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Rejected)
    }
}

/// One transfer attempt of a single part number between the two locations.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfer_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub from_location: Location,
    pub to_location: Location,
    pub part_number: String,
    /// Catalog snapshot taken at creation, never resynced
    pub display_name: String,
    pub brand: Option<String>,
    pub application: Option<String>,
    pub requested_quantity: i32,
    pub approved_quantity: Option<i32>,
    pub sent_quantity: Option<i32>,
    /// Credited back to the sender when a sent request is rejected
    pub compensated_quantity: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub reject_reason: Option<String>,
    pub status: TransferStatus,
    pub requested_by: String,
    pub approved_by: Option<String>,
    pub sent_by: Option<String>,
    pub received_by: Option<String>,
    pub rejected_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// The latest quantity override: sent, then approved, then requested.
    pub fn effective_quantity(&self) -> i32 {
        self.sent_quantity
            .or(self.approved_quantity)
            .unwrap_or(self.requested_quantity)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
