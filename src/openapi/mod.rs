use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kirim Barang API",
        version = "1.0.0",
        description = r#"
# Inter-store transfer service

Moves stock between warehouse locations `A` and `B` through a
request, approval, send and receive pipeline.

## Operator identity

Every endpoint under `/api/v1/transfers` requires two headers:

```
X-Operator-Id: <operator id>
X-Store-Location: A | B
```

## Mutations

Mutating endpoints always answer HTTP 200 with an action result:

```json
{ "success": false, "error": "Conflict: ...", "code": "conflict" }
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "transfers", description = "Inter-store transfer requests"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::transfers::search_candidates,
        crate::handlers::transfers::list_transfers,
        crate::handlers::transfers::create_transfer,
        crate::handlers::transfers::get_transfer,
        crate::handlers::transfers::transfer_history,
        crate::handlers::transfers::approve_transfer,
        crate::handlers::transfers::send_transfer,
        crate::handlers::transfers::receive_transfer,
        crate::handlers::transfers::reject_transfer,
        crate::handlers::transfers::delete_transfer,
        crate::handlers::transfers::update_part_number,
        crate::handlers::transfers::bulk_send,
        crate::handlers::transfers::stock_comparison,
        crate::handlers::transfers::shelf_comparison,
        crate::handlers::transfers::in_transit,
    ),
    components(
        schemas(
            crate::services::transfers::ActionResponse,
            crate::services::transfers::BulkSendOutcome,
            crate::services::transfers::comparison::StockPair,
            crate::services::transfers::comparison::ShelfPair,
            crate::services::transfers::filters::StatusFilter,
            crate::services::transfers::filters::Direction,
            crate::entities::Location,
            crate::entities::TransferStatus,
            crate::entities::HistoryAction,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
