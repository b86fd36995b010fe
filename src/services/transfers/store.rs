//! Persistence for transfer requests and their audit trail.
//!
//! Every function is generic over the connection so callers can run it on
//! the pool or inside an open transaction.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::filters::{Direction, TransferFilter};
use crate::{
    entities::{
        transfer_history::{self, Column as HistoryColumn, Entity as TransferHistory},
        transfer_request::{self, Column as TransferColumn, Entity as TransferRequest},
        HistoryAction, Location, TransferStatus,
    },
    errors::ServiceError,
    services::candidate_search::like_pattern,
};

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub from_location: Location,
    pub to_location: Location,
    pub part_number: String,
    pub display_name: String,
    pub brand: Option<String>,
    pub application: Option<String>,
    pub requested_quantity: i32,
    pub note: Option<String>,
    pub requested_by: String,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub transfer_id: Uuid,
    pub action: HistoryAction,
    pub from_status: Option<TransferStatus>,
    pub to_status: Option<TransferStatus>,
    pub actor: String,
    pub location: Location,
    pub quantity: Option<i32>,
    pub detail: Option<String>,
}

/// Page bounds applied to every listing.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_size: u64,
    pub max_size: u64,
}

impl PageLimits {
    pub fn resolve(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_size)
            .clamp(1, self.max_size.max(1))
    }
}

/// Outgoing quantity still travelling between locations for one part number.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct InTransitLine {
    pub part_number: String,
    pub quantity: i64,
    pub requests: i64,
}

#[instrument(skip(conn, new), fields(part_number = %new.part_number))]
pub async fn create<C: ConnectionTrait>(
    conn: &C,
    new: NewTransfer,
) -> Result<transfer_request::Model, ServiceError> {
    let now = Utc::now();
    let model = transfer_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        from_location: Set(new.from_location),
        to_location: Set(new.to_location),
        part_number: Set(new.part_number),
        display_name: Set(new.display_name),
        brand: Set(new.brand),
        application: Set(new.application),
        requested_quantity: Set(new.requested_quantity),
        approved_quantity: Set(None),
        sent_quantity: Set(None),
        compensated_quantity: Set(None),
        note: Set(new.note),
        reject_reason: Set(None),
        status: Set(TransferStatus::Pending),
        requested_by: Set(new.requested_by),
        approved_by: Set(None),
        sent_by: Set(None),
        received_by: Set(None),
        rejected_by: Set(None),
        created_at: Set(now),
        approved_at: Set(None),
        sent_at: Set(None),
        received_at: Set(None),
        rejected_at: Set(None),
        updated_at: Set(now),
    };

    model.insert(conn).await.map_err(ServiceError::db_error)
}

pub async fn find<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<transfer_request::Model>, ServiceError> {
    TransferRequest::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub async fn get<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<transfer_request::Model, ServiceError> {
    find(conn, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", id)))
}

pub async fn find_many<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<Vec<transfer_request::Model>, ServiceError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    TransferRequest::find()
        .filter(TransferColumn::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Lists requests visible to `location`, newest first by the date column the
/// status filter selects.
#[instrument(skip(conn, filter))]
pub async fn list<C: ConnectionTrait>(
    conn: &C,
    location: Location,
    filter: &TransferFilter,
    limits: PageLimits,
    now: DateTime<Utc>,
) -> Result<Vec<transfer_request::Model>, ServiceError> {
    let date_column = filter.status.date_field().column();
    let mut query = TransferRequest::find();

    if let Some(status) = filter.status.status() {
        query = query.filter(TransferColumn::Status.eq(status));
    }

    query = match filter.direction {
        Direction::Incoming => query.filter(TransferColumn::ToLocation.eq(location)),
        Direction::Outgoing => query.filter(TransferColumn::FromLocation.eq(location)),
        Direction::Both => query.filter(
            Condition::any()
                .add(TransferColumn::ToLocation.eq(location))
                .add(TransferColumn::FromLocation.eq(location)),
        ),
    };

    if let Some(range) = filter.period.range(now) {
        query = query
            .filter(date_column.gte(range.start))
            .filter(date_column.lt(range.end));
    }

    if let Some(text) = filter.search_text() {
        let pattern = like_pattern(&text);
        query = query.filter(
            Condition::any()
                .add(
                    Expr::expr(Func::lower(Expr::col(TransferColumn::PartNumber)))
                        .like(LikeExpr::new(pattern.clone()).escape('\\')),
                )
                .add(
                    Expr::expr(Func::lower(Expr::col(TransferColumn::DisplayName)))
                        .like(LikeExpr::new(pattern).escape('\\')),
                ),
        );
    }

    let rows = query
        .order_by_desc(date_column)
        .order_by_desc(TransferColumn::CreatedAt)
        .limit(limits.resolve(filter.limit))
        .offset(filter.offset.unwrap_or(0))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    debug!(count = rows.len(), "listed transfers");
    Ok(rows)
}

/// Applies `mutation` only while the row still has `expected` status.
///
/// Zero affected rows means another actor moved the request on (`Conflict`)
/// or it no longer exists (`NotFound`).
#[instrument(skip(conn, mutation))]
pub async fn update_transition<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    expected: TransferStatus,
    mutation: transfer_request::ActiveModel,
) -> Result<transfer_request::Model, ServiceError> {
    let result = TransferRequest::update_many()
        .set(mutation)
        .filter(TransferColumn::Id.eq(id))
        .filter(TransferColumn::Status.eq(expected))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(missing_or_moved(conn, id, expected).await?);
    }

    get(conn, id).await
}

/// Hard-deletes a request that is still pending.
pub async fn delete_pending<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<(), ServiceError> {
    let result = TransferRequest::delete_many()
        .filter(TransferColumn::Id.eq(id))
        .filter(TransferColumn::Status.eq(TransferStatus::Pending))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(missing_or_moved(conn, id, TransferStatus::Pending).await?);
    }
    Ok(())
}

async fn missing_or_moved<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    expected: TransferStatus,
) -> Result<ServiceError, ServiceError> {
    Ok(match find(conn, id).await? {
        Some(current) => ServiceError::Conflict(format!(
            "Transfer {} is {}, expected {}",
            id, current.status, expected
        )),
        None => ServiceError::NotFound(format!("Transfer {} not found", id)),
    })
}

pub async fn append_history<C: ConnectionTrait>(
    conn: &C,
    entry: HistoryEntry,
) -> Result<transfer_history::Model, ServiceError> {
    transfer_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        transfer_id: Set(entry.transfer_id),
        action: Set(entry.action),
        from_status: Set(entry.from_status),
        to_status: Set(entry.to_status),
        actor: Set(entry.actor),
        location: Set(entry.location),
        quantity: Set(entry.quantity),
        detail: Set(entry.detail),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// Audit rows for one request, oldest first. Rows outlive a deleted request.
pub async fn history<C: ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<Vec<transfer_history::Model>, ServiceError> {
    TransferHistory::find()
        .filter(HistoryColumn::TransferId.eq(transfer_id))
        .order_by_asc(HistoryColumn::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Per part number, the total `sent_quantity` of requests leaving `location`
/// that have not been received or rejected yet.
pub async fn in_transit<C: ConnectionTrait>(
    conn: &C,
    location: Location,
) -> Result<Vec<InTransitLine>, ServiceError> {
    let rows = TransferRequest::find()
        .select_only()
        .column(TransferColumn::PartNumber)
        .column_as(Expr::col(TransferColumn::SentQuantity).sum(), "quantity")
        .column_as(Expr::col(TransferColumn::Id).count(), "requests")
        .filter(TransferColumn::FromLocation.eq(location))
        .filter(TransferColumn::Status.eq(TransferStatus::Sent))
        .group_by(TransferColumn::PartNumber)
        .order_by_asc(TransferColumn::PartNumber)
        .into_tuple::<(String, Option<i64>, i64)>()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(rows
        .into_iter()
        .map(|(part_number, quantity, requests)| InTransitLine {
            part_number,
            quantity: quantity.unwrap_or(0),
            requests,
        })
        .collect())
}
