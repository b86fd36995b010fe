//! Inter-store transfer workflow.
//!
//! [`TransferService`] drives the pure rules in [`state_machine`] against the
//! [`store`] and the [`StockLedger`], one database transaction per transition.

pub mod bulk_send;
pub mod comparison;
pub mod filters;
pub mod state_machine;
pub mod store;

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use self::{
    comparison::{AnnotatedTransfer, Comparator, ShelfPair, StockPair},
    filters::TransferFilter,
    state_machine::{LedgerEffect, Transition, TransitionPlan},
    store::{HistoryEntry, InTransitLine, NewTransfer, PageLimits},
};
pub use self::{
    bulk_send::{BulkSendOutcome, BulkSendReport},
    state_machine::Operator,
};
use crate::{
    config::AppConfig,
    dto::transfers::CreateTransferRequest,
    entities::{transfer_history, transfer_request, HistoryAction, Location},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        candidate_search::{Candidate, CandidateSearch},
        stock_ledger::{ItemSnapshot, StockLedger},
    },
};

lazy_static! {
    static ref TRANSFERS_CREATED: IntCounter = register_int_counter!(
        "transfers_created_total",
        "Total number of transfer requests created"
    )
    .expect("metric can be created");
}

/// Uniform result of every mutating operation, rendered by callers as a
/// non-fatal notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind, see `ServiceError::code`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ActionResponse {
    pub fn ok(id: Uuid) -> Self {
        Self {
            success: true,
            id: Some(id),
            error: None,
            code: None,
        }
    }

    pub fn failed(err: &ServiceError) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(err.response_message()),
            code: Some(err.code().to_string()),
        }
    }
}

impl From<Result<Uuid, ServiceError>> for ActionResponse {
    fn from(result: Result<Uuid, ServiceError>) -> Self {
        match result {
            Ok(id) => ActionResponse::ok(id),
            Err(e) => {
                warn!(code = e.code(), error = %e, "transfer action failed");
                ActionResponse::failed(&e)
            }
        }
    }
}

/// Tunables the service reads from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub bulk_send_concurrency: usize,
    pub comparison_batch_size: usize,
    pub candidate_search_limit: u64,
    pub allow_negative_stock: bool,
    pub page_limits: PageLimits,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            bulk_send_concurrency: 4,
            comparison_batch_size: 500,
            candidate_search_limit: 25,
            allow_negative_stock: false,
            page_limits: PageLimits {
                default_size: 50,
                max_size: 500,
            },
        }
    }
}

impl From<&AppConfig> for TransferSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            bulk_send_concurrency: config.bulk_send_concurrency,
            comparison_batch_size: config.comparison_batch_size,
            candidate_search_limit: config.candidate_search_limit,
            allow_negative_stock: config.allow_negative_stock,
            page_limits: PageLimits {
                default_size: config.api_default_page_size,
                max_size: config.api_max_page_size,
            },
        }
    }
}

/// What the transaction produced, used for post-commit events.
struct Applied {
    before: transfer_request::Model,
    after: Option<transfer_request::Model>,
    plan: TransitionPlan,
    new_quantity: Option<i32>,
}

#[derive(Clone)]
pub struct TransferService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    ledger: StockLedger,
    search: CandidateSearch,
    comparator: Comparator,
    settings: TransferSettings,
}

impl TransferService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        settings: TransferSettings,
    ) -> Self {
        Self {
            db,
            event_sender,
            ledger: StockLedger::new(settings.allow_negative_stock),
            search: CandidateSearch::new(settings.candidate_search_limit),
            comparator: Comparator::new(settings.comparison_batch_size),
            settings,
        }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub async fn search_candidates(
        &self,
        query: &str,
        location: Location,
    ) -> Result<Vec<Candidate>, ServiceError> {
        self.search.search(&*self.db, query, location).await
    }

    /// Stores a new pending request. The display snapshot comes from the
    /// payload or, when absent, from the sending location's catalog.
    #[instrument(skip(self, input), fields(operator = %operator.id, part_number = %input.part_number))]
    pub async fn create_request(
        &self,
        input: CreateTransferRequest,
        operator: &Operator,
    ) -> Result<transfer_request::Model, ServiceError> {
        let from_location = input.from_location.unwrap_or(operator.home_location);
        let part_number = input.part_number.trim().to_string();
        state_machine::validate_create(
            operator,
            from_location,
            input.to_location,
            &part_number,
            input.quantity,
        )
        .map_err(|e| {
            metrics::record_transition("create", e.code());
            e
        })?;
        validator::Validate::validate(&input)?;

        let snapshot = match input.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => ItemSnapshot {
                name: name.to_string(),
                brand: input.brand.clone(),
                application: input.application.clone(),
            },
            None => {
                let item = self
                    .ledger
                    .find(&*self.db, from_location, &part_number)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Part {} is not in the catalog at {}",
                            part_number, from_location
                        ))
                    })?;
                ItemSnapshot {
                    name: item.name,
                    brand: input.brand.clone().or(item.brand),
                    application: input.application.clone().or(item.application),
                }
            }
        };

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let inserted =
            Self::insert_with_history(&txn, operator, from_location, input, part_number, snapshot)
                .await;
        let created = match inserted {
            Ok(created) => created,
            Err(e) => {
                rollback(txn).await;
                metrics::record_transition("create", e.code());
                if e.is_internal() {
                    error!(error = %e, "transfer request insert failed");
                }
                return Err(e);
            }
        };
        txn.commit().await.map_err(ServiceError::db_error)?;

        TRANSFERS_CREATED.inc();
        metrics::record_transition("create", "ok");
        info!(
            transfer_id = %created.id,
            from = %created.from_location,
            to = %created.to_location,
            quantity = created.requested_quantity,
            "transfer request created"
        );
        self.event_sender
            .send_or_log(Event::TransferCreated {
                transfer_id: created.id,
                from_location: created.from_location,
                to_location: created.to_location,
                part_number: created.part_number.clone(),
                quantity: created.requested_quantity,
            })
            .await;

        Ok(created)
    }

    async fn insert_with_history(
        txn: &DatabaseTransaction,
        operator: &Operator,
        from_location: Location,
        input: CreateTransferRequest,
        part_number: String,
        snapshot: ItemSnapshot,
    ) -> Result<transfer_request::Model, ServiceError> {
        let created = store::create(
            txn,
            NewTransfer {
                from_location,
                to_location: input.to_location,
                part_number,
                display_name: snapshot.name,
                brand: snapshot.brand,
                application: snapshot.application,
                requested_quantity: input.quantity,
                note: input.note.filter(|n| !n.trim().is_empty()),
                requested_by: operator.id.clone(),
            },
        )
        .await?;

        store::append_history(
            txn,
            HistoryEntry {
                transfer_id: created.id,
                action: HistoryAction::Created,
                from_status: None,
                to_status: Some(created.status),
                actor: operator.id.clone(),
                location: operator.home_location,
                quantity: Some(created.requested_quantity),
                detail: created.note.clone(),
            },
        )
        .await?;

        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<transfer_request::Model, ServiceError> {
        store::get(&*self.db, id).await
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<transfer_history::Model>, ServiceError> {
        store::history(&*self.db, id).await
    }

    pub async fn list_requests(
        &self,
        location: Location,
        filter: &TransferFilter,
    ) -> Result<Vec<transfer_request::Model>, ServiceError> {
        store::list(
            &*self.db,
            location,
            filter,
            self.settings.page_limits,
            Utc::now(),
        )
        .await
    }

    /// Listing with both locations' stock and the sender shelf attached.
    pub async fn list_annotated(
        &self,
        location: Location,
        filter: &TransferFilter,
    ) -> Result<Vec<AnnotatedTransfer>, ServiceError> {
        let requests = self.list_requests(location, filter).await?;
        self.comparator.annotate(&*self.db, requests).await
    }

    pub async fn approve(
        &self,
        id: Uuid,
        operator: &Operator,
        quantity_override: Option<i32>,
    ) -> Result<transfer_request::Model, ServiceError> {
        self.transition(id, operator, Transition::Approve { quantity: quantity_override })
            .await
    }

    pub async fn send(
        &self,
        id: Uuid,
        operator: &Operator,
        quantity_override: Option<i32>,
    ) -> Result<transfer_request::Model, ServiceError> {
        self.transition(id, operator, Transition::Send { quantity: quantity_override })
            .await
    }

    pub async fn receive(
        &self,
        id: Uuid,
        operator: &Operator,
    ) -> Result<transfer_request::Model, ServiceError> {
        self.transition(id, operator, Transition::Receive).await
    }

    pub async fn reject(
        &self,
        id: Uuid,
        operator: &Operator,
        reason: &str,
    ) -> Result<transfer_request::Model, ServiceError> {
        self.transition(
            id,
            operator,
            Transition::Reject {
                reason: reason.to_string(),
            },
        )
        .await
    }

    pub async fn update_part_number(
        &self,
        id: Uuid,
        operator: &Operator,
        new_part_number: &str,
    ) -> Result<transfer_request::Model, ServiceError> {
        self.transition(
            id,
            operator,
            Transition::EditPartNumber {
                part_number: new_part_number.to_string(),
            },
        )
        .await
    }

    /// Hard-deletes a pending request; history rows are kept.
    pub async fn delete(&self, id: Uuid, operator: &Operator) -> Result<(), ServiceError> {
        self.apply(id, operator, Transition::Delete).await.map(|_| ())
    }

    async fn transition(
        &self,
        id: Uuid,
        operator: &Operator,
        transition: Transition,
    ) -> Result<transfer_request::Model, ServiceError> {
        let applied = self.apply(id, operator, transition).await?;
        applied
            .after
            .ok_or_else(|| ServiceError::InternalError(format!("Transfer {} vanished", id)))
    }

    pub async fn get_bulk_stock_comparison(
        &self,
        part_numbers: &[String],
    ) -> Result<BTreeMap<String, StockPair>, ServiceError> {
        self.comparator.stock_comparison(&*self.db, part_numbers).await
    }

    pub async fn get_bulk_shelf_comparison(
        &self,
        part_numbers: &[String],
    ) -> Result<BTreeMap<String, ShelfPair>, ServiceError> {
        self.comparator.shelf_comparison(&*self.db, part_numbers).await
    }

    pub async fn in_transit_summary(
        &self,
        location: Location,
    ) -> Result<Vec<InTransitLine>, ServiceError> {
        store::in_transit(&*self.db, location).await
    }

    /// Runs one transition in its own transaction and emits events after
    /// commit. Any failure rolls the whole transition back.
    #[instrument(skip(self, transition), fields(transition = transition.name(), operator = %operator.id))]
    async fn apply(
        &self,
        id: Uuid,
        operator: &Operator,
        transition: Transition,
    ) -> Result<Applied, ServiceError> {
        let name = transition.name();
        let applied = match self.run(id, operator, &transition).await {
            Ok(applied) => applied,
            Err(e) => {
                metrics::record_transition(name, e.code());
                log_failure(id, &e);
                return Err(e);
            }
        };

        metrics::record_transition(name, "ok");
        info!(
            transfer_id = %id,
            from_status = %applied.plan.expected_status,
            to_status = ?applied.plan.next_status,
            quantity = ?applied.plan.quantity,
            "transfer transition applied"
        );
        self.emit(&applied, operator, &transition).await;
        Ok(applied)
    }

    /// Plans against a plain read, then commits the plan only if the row still
    /// has the status it was planned from.
    async fn run(
        &self,
        id: Uuid,
        operator: &Operator,
        transition: &Transition,
    ) -> Result<Applied, ServiceError> {
        let before = store::get(&*self.db, id).await?;
        let plan = state_machine::plan(&before, operator, transition)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        match self.apply_in(&txn, before, plan, operator, transition).await {
            Ok(applied) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                Ok(applied)
            }
            Err(e) => {
                rollback(txn).await;
                Err(e)
            }
        }
    }

    /// The guarded status write is the first statement so SQLite takes its
    /// write lock before this transaction has read anything.
    async fn apply_in(
        &self,
        txn: &DatabaseTransaction,
        before: transfer_request::Model,
        plan: TransitionPlan,
        operator: &Operator,
        transition: &Transition,
    ) -> Result<Applied, ServiceError> {
        let id = before.id;
        let now = Utc::now();

        let after = match plan.next_status {
            Some(_) => Some(
                store::update_transition(
                    txn,
                    id,
                    plan.expected_status,
                    mutation(operator, transition, &plan, now),
                )
                .await?,
            ),
            None => {
                store::delete_pending(txn, id).await?;
                None
            }
        };

        let new_quantity = match plan.ledger {
            LedgerEffect::None => None,
            LedgerEffect::Debit { location, quantity } => Some(
                self.ledger
                    .adjust_quantity(txn, location, &before.part_number, -quantity)
                    .await?,
            ),
            LedgerEffect::Credit { location, quantity } => {
                let snapshot = ItemSnapshot {
                    name: before.display_name.clone(),
                    brand: before.brand.clone(),
                    application: before.application.clone(),
                };
                Some(
                    self.ledger
                        .credit(txn, location, &before.part_number, quantity, &snapshot)
                        .await?,
                )
            }
        };

        store::append_history(
            txn,
            HistoryEntry {
                transfer_id: id,
                action: transition.history_action(),
                from_status: Some(plan.expected_status),
                to_status: plan.next_status,
                actor: operator.id.clone(),
                location: operator.home_location,
                quantity: plan.quantity,
                detail: history_detail(&before, transition),
            },
        )
        .await?;

        Ok(Applied {
            before,
            after,
            plan,
            new_quantity,
        })
    }

    async fn emit(&self, applied: &Applied, operator: &Operator, transition: &Transition) {
        let id = applied.before.id;
        let event = match (transition, &applied.after) {
            (Transition::Delete, _) => Event::TransferDeleted {
                transfer_id: id,
                actor: operator.id.clone(),
            },
            (Transition::EditPartNumber { .. }, Some(after)) => Event::TransferPartNumberChanged {
                transfer_id: id,
                old_part_number: applied.before.part_number.clone(),
                new_part_number: after.part_number.clone(),
            },
            (_, Some(after)) => Event::TransferStatusChanged {
                transfer_id: id,
                old_status: applied.before.status,
                new_status: after.status,
                actor: operator.id.clone(),
                quantity: applied.plan.quantity,
                timestamp: after.updated_at,
            },
            (_, None) => return,
        };
        self.event_sender.send_or_log(event).await;

        if let (Some((location, delta)), Some(new_quantity)) =
            (applied.plan.ledger.delta(), applied.new_quantity)
        {
            self.event_sender
                .send_or_log(Event::StockAdjusted {
                    location,
                    part_number: applied.before.part_number.clone(),
                    delta,
                    new_quantity,
                    transfer_id: id,
                })
                .await;
        }
    }
}

fn log_failure(id: Uuid, e: &ServiceError) {
    if e.is_internal() {
        error!(transfer_id = %id, code = e.code(), error = %e, "transition failed");
    } else {
        warn!(transfer_id = %id, code = e.code(), error = %e, "transition refused");
    }
}

async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        error!(error = %e, "failed to roll back transfer transaction");
    }
}

/// Columns a transition writes. Fields left unset keep their stored value.
fn mutation(
    operator: &Operator,
    transition: &Transition,
    plan: &TransitionPlan,
    now: DateTime<Utc>,
) -> transfer_request::ActiveModel {
    let mut model = transfer_request::ActiveModel {
        updated_at: Set(now),
        ..Default::default()
    };
    if let Some(next) = plan.next_status {
        model.status = Set(next);
    }

    let actor = Some(operator.id.clone());
    match transition {
        Transition::Approve { .. } => {
            model.approved_quantity = Set(plan.quantity);
            model.approved_by = Set(actor);
            model.approved_at = Set(Some(now));
        }
        Transition::Send { .. } => {
            model.sent_quantity = Set(plan.quantity);
            model.sent_by = Set(actor);
            model.sent_at = Set(Some(now));
        }
        Transition::Receive => {
            model.received_by = Set(actor);
            model.received_at = Set(Some(now));
        }
        Transition::Reject { reason } => {
            model.rejected_by = Set(actor);
            model.rejected_at = Set(Some(now));
            model.reject_reason = Set(Some(reason.trim().to_string()));
            if matches!(plan.ledger, LedgerEffect::Credit { .. }) {
                model.compensated_quantity = Set(plan.quantity);
            }
        }
        Transition::EditPartNumber { part_number } => {
            model.part_number = Set(part_number.trim().to_string());
        }
        Transition::Delete => {}
    }
    model
}

fn history_detail(before: &transfer_request::Model, transition: &Transition) -> Option<String> {
    match transition {
        Transition::Reject { reason } => Some(reason.trim().to_string()),
        Transition::EditPartNumber { part_number } => Some(format!(
            "{} -> {}",
            before.part_number,
            part_number.trim()
        )),
        _ => None,
    }
}
