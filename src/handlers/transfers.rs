use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::OperatorContext;
use crate::{
    dto::transfers::{
        BulkSendRequest, CreateTransferRequest, HistoryResponse, PartNumbersRequest,
        QuantityOverrideRequest, RejectTransferRequest, TransferResponse, UpdatePartNumberRequest,
    },
    errors::ServiceError,
    services::{
        candidate_search::Candidate,
        transfers::{
            comparison::{AnnotatedTransfer, ShelfPair, StockPair},
            filters::{Direction, Period, StatusFilter, TransferFilter},
            store::InTransitLine,
            ActionResponse, BulkSendReport,
        },
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Default, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct CandidateQuery {
    /// Free text matched against part number, name, brand and application
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, Default, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListTransfersQuery {
    /// all, pending, approved, sent, completed or rejected
    pub status: Option<String>,
    /// incoming, outgoing or both, relative to the operator's location
    pub direction: Option<String>,
    pub search: Option<String>,
    /// all_time, today, this_week, this_month, this_year or custom
    pub period: Option<String>,
    /// First day of a custom period (inclusive)
    pub from: Option<NaiveDate>,
    /// Last day of a custom period (inclusive)
    pub to: Option<NaiveDate>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListTransfersQuery {
    pub fn into_filter(self) -> Result<TransferFilter, ServiceError> {
        fn parse<T: std::str::FromStr + Default>(
            value: Option<&str>,
            what: &str,
        ) -> Result<T, ServiceError> {
            match value.map(str::trim).filter(|v| !v.is_empty()) {
                None => Ok(T::default()),
                Some(raw) => raw
                    .parse()
                    .map_err(|_| ServiceError::ValidationError(format!("Unknown {}: {}", what, raw))),
            }
        }

        Ok(TransferFilter {
            status: parse::<StatusFilter>(self.status.as_deref(), "status")?,
            direction: parse::<Direction>(self.direction.as_deref(), "direction")?,
            search: self.search,
            period: Period::parse(self.period.as_deref().unwrap_or(""), self.from, self.to)?,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

pub fn transfers_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transfers).post(create_transfer))
        .route("/candidates", get(search_candidates))
        .route("/in-transit", get(in_transit))
        .route("/bulk-send", post(bulk_send))
        .route("/stock-comparison", post(stock_comparison))
        .route("/shelf-comparison", post(shelf_comparison))
        .route("/:id", get(get_transfer).delete(delete_transfer))
        .route("/:id/history", get(transfer_history))
        .route("/:id/approve", post(approve_transfer))
        .route("/:id/send", post(send_transfer))
        .route("/:id/receive", post(receive_transfer))
        .route("/:id/reject", post(reject_transfer))
        .route("/:id/part-number", put(update_part_number))
}

#[utoipa::path(
    get,
    path = "/api/v1/transfers/candidates",
    params(CandidateQuery),
    responses(
        (status = 200, description = "Catalog matches at the operator's location", body = ApiResponse<Vec<Candidate>>),
        (status = 401, description = "Missing operator headers", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn search_candidates(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Query(query): Query<CandidateQuery>,
) -> ApiResult<Vec<Candidate>> {
    let candidates = state
        .transfer_service
        .search_candidates(query.q.as_deref().unwrap_or(""), operator.home_location)
        .await?;
    Ok(Json(ApiResponse::success(candidates)))
}

#[utoipa::path(
    get,
    path = "/api/v1/transfers",
    params(ListTransfersQuery),
    responses(
        (status = 200, description = "Requests with stock at both locations", body = ApiResponse<Vec<AnnotatedTransfer>>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing operator headers", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn list_transfers(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Query(query): Query<ListTransfersQuery>,
) -> ApiResult<Vec<AnnotatedTransfer>> {
    let filter = query.into_filter()?;
    let items = state
        .transfer_service
        .list_annotated(operator.home_location, &filter)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 200, description = "Outcome of the create", body = ActionResponse),
        (status = 401, description = "Missing operator headers", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Json(payload): Json<CreateTransferRequest>,
) -> Json<ActionResponse> {
    let result = state
        .transfer_service
        .create_request(payload, &operator)
        .await
        .map(|created| created.id);
    Json(result.into())
}

#[utoipa::path(
    get,
    path = "/api/v1/transfers/{id}",
    params(("id" = Uuid, Path, description = "Transfer id")),
    responses(
        (status = 200, description = "Transfer request", body = ApiResponse<TransferResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    OperatorContext(_operator): OperatorContext,
    Path(id): Path<Uuid>,
) -> ApiResult<TransferResponse> {
    let transfer = state.transfer_service.get(id).await?;
    Ok(Json(ApiResponse::success(transfer.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/transfers/{id}/history",
    params(("id" = Uuid, Path, description = "Transfer id")),
    responses(
        (status = 200, description = "Audit trail, oldest first", body = ApiResponse<Vec<HistoryResponse>>)
    ),
    tag = "transfers"
)]
pub async fn transfer_history(
    State(state): State<AppState>,
    OperatorContext(_operator): OperatorContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<HistoryResponse>> {
    let rows = state.transfer_service.history(id).await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(HistoryResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/approve",
    params(("id" = Uuid, Path, description = "Transfer id")),
    request_body(content = QuantityOverrideRequest, description = "Optional approved quantity"),
    responses((status = 200, description = "Outcome of the approval", body = ActionResponse)),
    tag = "transfers"
)]
pub async fn approve_transfer(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<QuantityOverrideRequest>>,
) -> Json<ActionResponse> {
    let quantity = payload.and_then(|Json(body)| body.quantity);
    let result = state
        .transfer_service
        .approve(id, &operator, quantity)
        .await
        .map(|t| t.id);
    Json(result.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/send",
    params(("id" = Uuid, Path, description = "Transfer id")),
    request_body(content = QuantityOverrideRequest, description = "Optional sent quantity"),
    responses((status = 200, description = "Outcome of the send", body = ActionResponse)),
    tag = "transfers"
)]
pub async fn send_transfer(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<QuantityOverrideRequest>>,
) -> Json<ActionResponse> {
    let quantity = payload.and_then(|Json(body)| body.quantity);
    let result = state
        .transfer_service
        .send(id, &operator, quantity)
        .await
        .map(|t| t.id);
    Json(result.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/receive",
    params(("id" = Uuid, Path, description = "Transfer id")),
    responses((status = 200, description = "Outcome of the receipt", body = ActionResponse)),
    tag = "transfers"
)]
pub async fn receive_transfer(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Path(id): Path<Uuid>,
) -> Json<ActionResponse> {
    let result = state
        .transfer_service
        .receive(id, &operator)
        .await
        .map(|t| t.id);
    Json(result.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/reject",
    params(("id" = Uuid, Path, description = "Transfer id")),
    request_body = RejectTransferRequest,
    responses((status = 200, description = "Outcome of the rejection", body = ActionResponse)),
    tag = "transfers"
)]
pub async fn reject_transfer(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectTransferRequest>,
) -> Json<ActionResponse> {
    let result = match payload.validate() {
        Ok(()) => state
            .transfer_service
            .reject(id, &operator, &payload.reason)
            .await
            .map(|t| t.id),
        Err(e) => Err(e.into()),
    };
    Json(result.into())
}

#[utoipa::path(
    delete,
    path = "/api/v1/transfers/{id}",
    params(("id" = Uuid, Path, description = "Transfer id")),
    responses((status = 200, description = "Outcome of the deletion", body = ActionResponse)),
    tag = "transfers"
)]
pub async fn delete_transfer(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Path(id): Path<Uuid>,
) -> Json<ActionResponse> {
    let result = state
        .transfer_service
        .delete(id, &operator)
        .await
        .map(|()| id);
    Json(result.into())
}

#[utoipa::path(
    put,
    path = "/api/v1/transfers/{id}/part-number",
    params(("id" = Uuid, Path, description = "Transfer id")),
    request_body = UpdatePartNumberRequest,
    responses((status = 200, description = "Outcome of the edit", body = ActionResponse)),
    tag = "transfers"
)]
pub async fn update_part_number(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePartNumberRequest>,
) -> Json<ActionResponse> {
    let result = match payload.validate() {
        Ok(()) => state
            .transfer_service
            .update_part_number(id, &operator, &payload.part_number)
            .await
            .map(|t| t.id),
        Err(e) => Err(e.into()),
    };
    Json(result.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/bulk-send",
    request_body = BulkSendRequest,
    responses(
        (status = 200, description = "Per-id outcome of the bulk send", body = ApiResponse<BulkSendReport>),
        (status = 400, description = "Invalid selection", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn bulk_send(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    Json(payload): Json<BulkSendRequest>,
) -> ApiResult<BulkSendReport> {
    payload.validate()?;
    let report = state
        .transfer_service
        .bulk_send(&payload.ids, &operator, &payload.quantities)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/stock-comparison",
    request_body = PartNumbersRequest,
    responses((status = 200, description = "Quantity at A and B per part number; unknown parts read 0")),
    tag = "transfers"
)]
pub async fn stock_comparison(
    State(state): State<AppState>,
    OperatorContext(_operator): OperatorContext,
    Json(payload): Json<PartNumbersRequest>,
) -> ApiResult<BTreeMap<String, StockPair>> {
    payload.validate()?;
    let map = state
        .transfer_service
        .get_bulk_stock_comparison(&payload.part_numbers)
        .await?;
    Ok(Json(ApiResponse::success(map)))
}

#[utoipa::path(
    post,
    path = "/api/v1/transfers/shelf-comparison",
    request_body = PartNumbersRequest,
    responses((status = 200, description = "Shelf code at A and B per part number; unknown shelves read -")),
    tag = "transfers"
)]
pub async fn shelf_comparison(
    State(state): State<AppState>,
    OperatorContext(_operator): OperatorContext,
    Json(payload): Json<PartNumbersRequest>,
) -> ApiResult<BTreeMap<String, ShelfPair>> {
    payload.validate()?;
    let map = state
        .transfer_service
        .get_bulk_shelf_comparison(&payload.part_numbers)
        .await?;
    Ok(Json(ApiResponse::success(map)))
}

#[utoipa::path(
    get,
    path = "/api/v1/transfers/in-transit",
    responses(
        (status = 200, description = "Sent but not yet received quantities leaving the operator's location", body = ApiResponse<Vec<InTransitLine>>)
    ),
    tag = "transfers"
)]
pub async fn in_transit(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
) -> ApiResult<Vec<InTransitLine>> {
    let lines = state
        .transfer_service
        .in_transit_summary(operator.home_location)
        .await?;
    Ok(Json(ApiResponse::success(lines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn empty_query_uses_defaults() {
        let filter = ListTransfersQuery::default().into_filter().unwrap();
        assert_eq!(filter, TransferFilter::default());
    }

    #[test]
    fn query_values_are_parsed() {
        let filter = ListTransfersQuery {
            status: Some("completed".into()),
            direction: Some("incoming".into()),
            period: Some("custom".into()),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 31),
            ..Default::default()
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.status, StatusFilter::Completed);
        assert_eq!(filter.direction, Direction::Incoming);
        assert_matches!(filter.period, Period::Custom { .. });
    }

    #[test]
    fn unknown_values_are_validation_errors() {
        let bad = ListTransfersQuery {
            direction: Some("sideways".into()),
            ..Default::default()
        };
        assert_matches!(bad.into_filter(), Err(ServiceError::ValidationError(_)));
    }
}
