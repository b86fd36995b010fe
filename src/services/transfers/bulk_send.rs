use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    filters::{Direction, StatusFilter},
    state_machine::Operator,
    store, TransferService,
};
use crate::{
    entities::transfer_request,
    errors::ServiceError,
    metrics,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkSendOutcome {
    pub id: Uuid,
    pub success: bool,
    /// Dropped by the pre-filter without attempting a send
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkSendOutcome {
    fn sent(id: Uuid) -> Self {
        Self {
            id,
            success: true,
            skipped: false,
            code: None,
            error: None,
        }
    }

    fn failed(id: Uuid, err: &ServiceError, skipped: bool) -> Self {
        Self {
            id,
            success: false,
            skipped,
            code: Some(err.code().to_string()),
            error: Some(err.response_message()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkSendReport {
    pub succeeded: usize,
    /// Includes skipped ids
    pub failed: usize,
    /// One entry per distinct id, in request order
    pub outcomes: Vec<BulkSendOutcome>,
}

impl BulkSendReport {
    fn from_outcomes(outcomes: Vec<BulkSendOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        Self {
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }
}

/// Keeps the first occurrence of each id.
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Splits the selection into ids worth sending and outcomes for ids that can
/// already be ruled out from the snapshot.
pub fn prefilter(
    ids: &[Uuid],
    current: &[transfer_request::Model],
    operator: &Operator,
) -> (Vec<Uuid>, Vec<BulkSendOutcome>) {
    let by_id: HashMap<Uuid, &transfer_request::Model> =
        current.iter().map(|r| (r.id, r)).collect();
    let mut eligible = Vec::new();
    let mut skipped = Vec::new();

    for &id in ids {
        let reason = match by_id.get(&id) {
            None => Some(ServiceError::NotFound(format!("Transfer {} not found", id))),
            Some(request) if !StatusFilter::Approved.matches(request) => {
                Some(ServiceError::Conflict(format!(
                    "Transfer {} is {}, expected approved",
                    id, request.status
                )))
            }
            Some(request) if !Direction::Outgoing.matches(request, operator.home_location) => {
                Some(ServiceError::Unauthorized(format!(
                    "Transfer {} ships from {}, operator is at {}",
                    id, request.from_location, operator.home_location
                )))
            }
            Some(_) => None,
        };

        match reason {
            Some(err) => skipped.push(BulkSendOutcome::failed(id, &err, true)),
            None => eligible.push(id),
        }
    }

    (eligible, skipped)
}

impl TransferService {
    /// Sends every approved request in `ids` independently with bounded
    /// parallelism. One failure never aborts its siblings.
    #[instrument(skip(self, ids, quantity_overrides), fields(operator = %operator.id, count = ids.len()))]
    pub async fn bulk_send(
        &self,
        ids: &[Uuid],
        operator: &Operator,
        quantity_overrides: &HashMap<Uuid, i32>,
    ) -> Result<BulkSendReport, ServiceError> {
        let ids = dedup_ids(ids);
        let current = store::find_many(&*self.db, &ids).await?;
        let (eligible, mut outcomes) = prefilter(&ids, &current, operator);

        let sent: Vec<BulkSendOutcome> = stream::iter(eligible)
            .map(|id| {
                let quantity = quantity_overrides.get(&id).copied();
                async move {
                    match self.send(id, operator, quantity).await {
                        Ok(_) => BulkSendOutcome::sent(id),
                        Err(e) => BulkSendOutcome::failed(id, &e, false),
                    }
                }
            })
            .buffer_unordered(self.settings.bulk_send_concurrency.max(1))
            .collect()
            .await;
        outcomes.extend(sent);

        let position: HashMap<Uuid, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        outcomes.sort_by_key(|o| position.get(&o.id).copied().unwrap_or(usize::MAX));

        for outcome in &outcomes {
            metrics::record_bulk_send_item(outcome.code.as_deref().unwrap_or("ok"));
        }

        let report = BulkSendReport::from_outcomes(outcomes);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "bulk send finished"
        );
        Ok(report)
    }
}
