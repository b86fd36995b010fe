#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use kirim_barang::{
    config::AppConfig,
    db,
    dto::transfers::CreateTransferRequest,
    entities::{transfer_request, Location},
    events,
    handlers::{LOCATION_HEADER, OPERATOR_HEADER},
    services::{
        stock_ledger::NewStockItem,
        transfers::{Operator, TransferService},
    },
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Application state over a fresh SQLite database.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        tweak(&mut cfg);
        Self::start(cfg, None).await
    }

    /// File-backed database with a real pool, so transactions on different
    /// connections contend the way they do in a deployment.
    pub async fn with_pool(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("temp dir for test database");
        let path = dir.path().join("kirim_barang.db");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        Self::start(cfg, Some(dir)).await
    }

    async fn start(cfg: AppConfig, db_dir: Option<TempDir>) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (sender, rx) = events::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(rx));

        let state = AppState::new(Arc::new(pool), cfg, sender);
        let router = kirim_barang::app_router(state.clone());

        Self {
            state,
            router,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn service(&self) -> &TransferService {
        &self.state.transfer_service
    }

    /// Owned handle for moving the service into spawned tasks.
    pub fn shared_service(&self) -> Arc<TransferService> {
        Arc::clone(&self.state.transfer_service)
    }

    pub async fn seed(&self, location: Location, part_number: &str, quantity: i32, shelf: Option<&str>) {
        self.service()
            .ledger()
            .insert_item(
                &*self.state.db,
                NewStockItem {
                    location,
                    part_number: part_number.to_string(),
                    name: format!("Item {}", part_number),
                    brand: Some("Aspira".to_string()),
                    application: Some("Vario 125".to_string()),
                    quantity,
                    shelf_code: shelf.map(str::to_string),
                },
            )
            .await
            .expect("seed stock");
    }

    pub async fn stock(&self, location: Location, part_number: &str) -> i32 {
        self.service()
            .ledger()
            .get_quantity(&*self.state.db, location, part_number)
            .await
            .expect("read stock")
    }

    /// Request raised by the operator at `from`, shipping `quantity` of
    /// `part_number` to `to`.
    pub async fn raise(
        &self,
        from: Location,
        to: Location,
        part_number: &str,
        quantity: i32,
    ) -> transfer_request::Model {
        self.service()
            .create_request(create_payload(Some(from), to, part_number, quantity), &operator(from))
            .await
            .expect("create transfer request")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        operator: Option<&Operator>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(op) = operator {
            builder = builder
                .header(OPERATOR_HEADER, op.id.as_str())
                .header(LOCATION_HEADER, op.home_location.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn operator(location: Location) -> Operator {
    match location {
        Location::A => Operator::new("ani", Location::A),
        Location::B => Operator::new("budi", Location::B),
    }
}

pub fn create_payload(
    from: Option<Location>,
    to: Location,
    part_number: &str,
    quantity: i32,
) -> CreateTransferRequest {
    CreateTransferRequest {
        from_location: from,
        to_location: to,
        part_number: part_number.to_string(),
        name: None,
        brand: None,
        application: None,
        quantity,
        note: None,
    }
}
