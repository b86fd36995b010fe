use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{transfer_history, transfer_request, HistoryAction, Location, TransferStatus};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateTransferRequest {
    /// Location the goods leave from; defaults to the operator's home location
    pub from_location: Option<Location>,
    pub to_location: Location,
    #[validate(length(min = 1, max = 64, message = "Part number must be 1-64 characters"))]
    pub part_number: String,
    /// Catalog snapshot; looked up at the sending location when omitted
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub brand: Option<String>,
    pub application: Option<String>,
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct QuantityOverrideRequest {
    /// Replaces the current effective quantity when present
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct RejectTransferRequest {
    #[validate(length(min = 1, max = 500, message = "Reason cannot be empty"))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdatePartNumberRequest {
    #[validate(length(min = 1, max = 64))]
    pub part_number: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct BulkSendRequest {
    #[validate(length(min = 1, max = 500, message = "Select between 1 and 500 transfers"))]
    pub ids: Vec<Uuid>,
    /// Per-id sent quantity overrides
    #[serde(default)]
    pub quantities: HashMap<Uuid, i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct PartNumbersRequest {
    #[validate(length(max = 10000))]
    pub part_numbers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferResponse {
    pub id: Uuid,
    pub from_location: Location,
    pub to_location: Location,
    pub part_number: String,
    pub display_name: String,
    pub brand: Option<String>,
    pub application: Option<String>,
    pub requested_quantity: i32,
    pub approved_quantity: Option<i32>,
    pub sent_quantity: Option<i32>,
    pub compensated_quantity: Option<i32>,
    /// Latest override: sent, then approved, then requested
    pub effective_quantity: i32,
    pub note: Option<String>,
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

impl From<transfer_request::Model> for TransferResponse {
    fn from(model: transfer_request::Model) -> Self {
        Self {
            effective_quantity: model.effective_quantity(),
            id: model.id,
            from_location: model.from_location,
            to_location: model.to_location,
            part_number: model.part_number,
            display_name: model.display_name,
            brand: model.brand,
            application: model.application,
            requested_quantity: model.requested_quantity,
            approved_quantity: model.approved_quantity,
            sent_quantity: model.sent_quantity,
            compensated_quantity: model.compensated_quantity,
            note: model.note,
            reject_reason: model.reject_reason,
            status: model.status,
            requested_by: model.requested_by,
            approved_by: model.approved_by,
            sent_by: model.sent_by,
            received_by: model.received_by,
            rejected_by: model.rejected_by,
            created_at: model.created_at,
            approved_at: model.approved_at,
            sent_at: model.sent_at,
            received_at: model.received_at,
            rejected_at: model.rejected_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub action: HistoryAction,
    pub from_status: Option<TransferStatus>,
    pub to_status: Option<TransferStatus>,
    pub actor: String,
    pub location: Location,
    pub quantity: Option<i32>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<transfer_history::Model> for HistoryResponse {
    fn from(model: transfer_history::Model) -> Self {
        Self {
            id: model.id,
            transfer_id: model.transfer_id,
            action: model.action,
            from_status: model.from_status,
            to_status: model.to_status,
            actor: model.actor,
            location: model.location,
            quantity: model.quantity,
            detail: model.detail,
            created_at: model.created_at,
        }
    }
}
