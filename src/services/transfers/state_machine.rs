//! Pure transition rules for transfer requests.
//!
//! Given a snapshot of a request, the acting operator and the requested
//! transition, [`plan`] decides whether the transition is allowed and what it
//! must do. Nothing here touches the database.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entities::{transfer_request, HistoryAction, Location, TransferStatus},
    errors::ServiceError,
};

/// The acting user and the location they operate from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Operator {
    pub id: String,
    pub home_location: Location,
}

impl Operator {
    pub fn new(id: impl Into<String>, home_location: Location) -> Self {
        Self {
            id: id.into(),
            home_location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Approve { quantity: Option<i32> },
    Send { quantity: Option<i32> },
    Receive,
    Reject { reason: String },
    Delete,
    EditPartNumber { part_number: String },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Approve { .. } => "approve",
            Transition::Send { .. } => "send",
            Transition::Receive => "receive",
            Transition::Reject { .. } => "reject",
            Transition::Delete => "delete",
            Transition::EditPartNumber { .. } => "edit_part_number",
        }
    }

    pub fn history_action(&self) -> HistoryAction {
        match self {
            Transition::Approve { .. } => HistoryAction::Approved,
            Transition::Send { .. } => HistoryAction::Sent,
            Transition::Receive => HistoryAction::Received,
            Transition::Reject { .. } => HistoryAction::Rejected,
            Transition::Delete => HistoryAction::Deleted,
            Transition::EditPartNumber { .. } => HistoryAction::PartNumberChanged,
        }
    }
}

/// Stock movement a transition performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    None,
    Debit { location: Location, quantity: i32 },
    Credit { location: Location, quantity: i32 },
}

impl LedgerEffect {
    /// Signed delta applied to the target location's quantity.
    pub fn delta(&self) -> Option<(Location, i32)> {
        match *self {
            LedgerEffect::None => None,
            LedgerEffect::Debit { location, quantity } => Some((location, -quantity)),
            LedgerEffect::Credit { location, quantity } => Some((location, quantity)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Status the conditional update must still observe.
    pub expected_status: TransferStatus,
    /// `None` for a hard delete.
    pub next_status: Option<TransferStatus>,
    /// Quantity recorded by the transition, if it carries one.
    pub quantity: Option<i32>,
    pub ledger: LedgerEffect,
}

fn require_status(
    request: &transfer_request::Model,
    expected: TransferStatus,
    transition: &Transition,
) -> Result<(), ServiceError> {
    if request.status != expected {
        return Err(ServiceError::Conflict(format!(
            "Cannot {} transfer {}: status is {}, expected {}",
            transition.name(),
            request.id,
            request.status,
            expected
        )));
    }
    Ok(())
}

fn require_actor(
    operator: &Operator,
    location: Location,
    transition: &Transition,
) -> Result<(), ServiceError> {
    if operator.home_location != location {
        return Err(ServiceError::Unauthorized(format!(
            "Only an operator at location {} may {} this transfer",
            location,
            transition.name()
        )));
    }
    Ok(())
}

/// Every quantity override must be strictly positive.
pub fn validate_quantity(quantity: i32) -> Result<i32, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::InvalidQuantity(format!(
            "Quantity must be greater than zero, got {}",
            quantity
        )));
    }
    Ok(quantity)
}

/// Checks a new request before it is stored.
pub fn validate_create(
    operator: &Operator,
    from_location: Location,
    to_location: Location,
    part_number: &str,
    requested_quantity: i32,
) -> Result<(), ServiceError> {
    if from_location == to_location {
        return Err(ServiceError::ValidationError(
            "Source and destination locations must differ".to_string(),
        ));
    }
    if part_number.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Part number cannot be empty".to_string(),
        ));
    }
    validate_quantity(requested_quantity)?;
    if operator.home_location != from_location {
        return Err(ServiceError::Unauthorized(format!(
            "Only an operator at location {} may create this transfer",
            from_location
        )));
    }
    Ok(())
}

/// Decides whether `operator` may apply `transition` to `request`.
///
/// Checks run in a fixed order: status, then actor, then input. A status
/// mismatch is always `Conflict`.
pub fn plan(
    request: &transfer_request::Model,
    operator: &Operator,
    transition: &Transition,
) -> Result<TransitionPlan, ServiceError> {
    if request.status.is_terminal() {
        return Err(ServiceError::Conflict(format!(
            "Transfer {} is already {}",
            request.id, request.status
        )));
    }

    match transition {
        Transition::Approve { quantity } => {
            require_status(request, TransferStatus::Pending, transition)?;
            require_actor(operator, request.from_location, transition)?;
            let quantity = validate_quantity(quantity.unwrap_or(request.effective_quantity()))?;
            Ok(TransitionPlan {
                expected_status: TransferStatus::Pending,
                next_status: Some(TransferStatus::Approved),
                quantity: Some(quantity),
                ledger: LedgerEffect::None,
            })
        }
        Transition::Send { quantity } => {
            require_status(request, TransferStatus::Approved, transition)?;
            require_actor(operator, request.from_location, transition)?;
            let quantity = validate_quantity(quantity.unwrap_or(request.effective_quantity()))?;
            Ok(TransitionPlan {
                expected_status: TransferStatus::Approved,
                next_status: Some(TransferStatus::Sent),
                quantity: Some(quantity),
                ledger: LedgerEffect::Debit {
                    location: request.from_location,
                    quantity,
                },
            })
        }
        Transition::Receive => {
            require_status(request, TransferStatus::Sent, transition)?;
            require_actor(operator, request.to_location, transition)?;
            let quantity = sent_quantity(request)?;
            Ok(TransitionPlan {
                expected_status: TransferStatus::Sent,
                next_status: Some(TransferStatus::Received),
                quantity: Some(quantity),
                ledger: LedgerEffect::Credit {
                    location: request.to_location,
                    quantity,
                },
            })
        }
        Transition::Reject { reason } => {
            let (actor_location, ledger, quantity) = match request.status {
                TransferStatus::Pending | TransferStatus::Approved => {
                    (request.from_location, LedgerEffect::None, None)
                }
                TransferStatus::Sent => {
                    let quantity = sent_quantity(request)?;
                    (
                        request.to_location,
                        LedgerEffect::Credit {
                            location: request.from_location,
                            quantity,
                        },
                        Some(quantity),
                    )
                }
                status => {
                    return Err(ServiceError::Conflict(format!(
                        "Cannot reject transfer {} while {}",
                        request.id, status
                    )))
                }
            };
            require_actor(operator, actor_location, transition)?;
            if reason.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Reject reason cannot be empty".to_string(),
                ));
            }
            Ok(TransitionPlan {
                expected_status: request.status,
                next_status: Some(TransferStatus::Rejected),
                quantity,
                ledger,
            })
        }
        Transition::Delete => {
            require_status(request, TransferStatus::Pending, transition)?;
            require_actor(operator, request.to_location, transition)?;
            Ok(TransitionPlan {
                expected_status: TransferStatus::Pending,
                next_status: None,
                quantity: None,
                ledger: LedgerEffect::None,
            })
        }
        Transition::EditPartNumber { part_number } => {
            require_status(request, TransferStatus::Pending, transition)?;
            require_actor(operator, request.from_location, transition)?;
            let part_number = part_number.trim();
            if part_number.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Part number cannot be empty".to_string(),
                ));
            }
            if part_number == request.part_number {
                return Err(ServiceError::ValidationError(format!(
                    "Part number is already {}",
                    part_number
                )));
            }
            Ok(TransitionPlan {
                expected_status: TransferStatus::Pending,
                next_status: Some(TransferStatus::Pending),
                quantity: None,
                ledger: LedgerEffect::None,
            })
        }
    }
}

fn sent_quantity(request: &transfer_request::Model) -> Result<i32, ServiceError> {
    request.sent_quantity.ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Transfer {} is sent but has no sent quantity",
            request.id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use proptest::prelude::*;
    use rstest::rstest;
    use uuid::Uuid;

    fn request(status: TransferStatus) -> transfer_request::Model {
        let now = Utc::now();
        transfer_request::Model {
            id: Uuid::new_v4(),
            from_location: Location::A,
            to_location: Location::B,
            part_number: "FLT-001".to_string(),
            display_name: "Oil filter".to_string(),
            brand: None,
            application: None,
            requested_quantity: 10,
            approved_quantity: matches!(
                status,
                TransferStatus::Approved | TransferStatus::Sent | TransferStatus::Received
            )
            .then_some(8),
            sent_quantity: matches!(status, TransferStatus::Sent | TransferStatus::Received)
                .then_some(8),
            compensated_quantity: None,
            note: None,
            reject_reason: None,
            status,
            requested_by: "op-a".to_string(),
            approved_by: None,
            sent_by: None,
            received_by: None,
            rejected_by: None,
            created_at: now,
            approved_at: None,
            sent_at: None,
            received_at: None,
            rejected_at: None,
            updated_at: now,
        }
    }

    fn at(location: Location) -> Operator {
        Operator::new(format!("op-{}", location), location)
    }

    fn reject(reason: &str) -> Transition {
        Transition::Reject {
            reason: reason.to_string(),
        }
    }

    #[rstest]
    #[case(TransferStatus::Pending, Transition::Approve { quantity: None }, Location::A)]
    #[case(TransferStatus::Approved, Transition::Send { quantity: None }, Location::A)]
    #[case(TransferStatus::Sent, Transition::Receive, Location::B)]
    #[case(TransferStatus::Pending, reject("wrong part"), Location::A)]
    #[case(TransferStatus::Approved, reject("wrong part"), Location::A)]
    #[case(TransferStatus::Sent, reject("damaged"), Location::B)]
    #[case(TransferStatus::Pending, Transition::Delete, Location::B)]
    #[case(
        TransferStatus::Pending,
        Transition::EditPartNumber { part_number: "FLT-002".into() },
        Location::A
    )]
    fn allowed_actor_gets_a_plan(
        #[case] status: TransferStatus,
        #[case] transition: Transition,
        #[case] actor: Location,
    ) {
        let req = request(status);
        assert!(plan(&req, &at(actor), &transition).is_ok());
        assert_matches!(
            plan(&req, &at(actor.other()), &transition),
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[rstest]
    #[case(TransferStatus::Approved, Transition::Approve { quantity: None })]
    #[case(TransferStatus::Pending, Transition::Send { quantity: None })]
    #[case(TransferStatus::Sent, Transition::Send { quantity: None })]
    #[case(TransferStatus::Approved, Transition::Receive)]
    #[case(TransferStatus::Received, Transition::Receive)]
    #[case(TransferStatus::Rejected, reject("again"))]
    #[case(TransferStatus::Approved, Transition::Delete)]
    #[case(TransferStatus::Sent, Transition::EditPartNumber { part_number: "X".into() })]
    fn status_mismatch_is_conflict(
        #[case] status: TransferStatus,
        #[case] transition: Transition,
    ) {
        let req = request(status);
        for location in [Location::A, Location::B] {
            assert_matches!(
                plan(&req, &at(location), &transition),
                Err(ServiceError::Conflict(_))
            );
        }
    }

    #[test]
    fn only_send_and_credits_touch_the_ledger() {
        let pending = request(TransferStatus::Pending);
        let approve = plan(&pending, &at(Location::A), &Transition::Approve { quantity: None })
            .unwrap();
        assert_eq!(approve.ledger, LedgerEffect::None);

        let approved = request(TransferStatus::Approved);
        let send = plan(&approved, &at(Location::A), &Transition::Send { quantity: None })
            .unwrap();
        assert_eq!(
            send.ledger,
            LedgerEffect::Debit {
                location: Location::A,
                quantity: 8
            }
        );

        let sent = request(TransferStatus::Sent);
        let receive = plan(&sent, &at(Location::B), &Transition::Receive).unwrap();
        assert_eq!(
            receive.ledger,
            LedgerEffect::Credit {
                location: Location::B,
                quantity: 8
            }
        );
    }

    #[test]
    fn reject_after_send_credits_the_sender_back() {
        let sent = request(TransferStatus::Sent);
        let plan = plan(&sent, &at(Location::B), &reject("damaged in transit")).unwrap();

        assert_eq!(plan.expected_status, TransferStatus::Sent);
        assert_eq!(plan.next_status, Some(TransferStatus::Rejected));
        assert_eq!(plan.ledger.delta(), Some((Location::A, 8)));
    }

    #[test]
    fn reject_needs_a_reason() {
        let pending = request(TransferStatus::Pending);
        assert_matches!(
            plan(&pending, &at(Location::A), &reject("   ")),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn delete_plan_has_no_next_status() {
        let pending = request(TransferStatus::Pending);
        let plan = plan(&pending, &at(Location::B), &Transition::Delete).unwrap();
        assert_eq!(plan.next_status, None);
        assert_eq!(plan.ledger, LedgerEffect::None);
    }

    #[test]
    fn edit_part_number_rejects_blank_and_unchanged() {
        let pending = request(TransferStatus::Pending);
        let op = at(Location::A);
        assert_matches!(
            plan(&pending, &op, &Transition::EditPartNumber { part_number: " ".into() }),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            plan(&pending, &op, &Transition::EditPartNumber { part_number: "FLT-001".into() }),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn send_defaults_to_the_approved_quantity() {
        let mut approved = request(TransferStatus::Approved);
        approved.approved_quantity = Some(6);
        let plan = plan(&approved, &at(Location::A), &Transition::Send { quantity: None })
            .unwrap();
        assert_eq!(plan.quantity, Some(6));
    }

    #[test]
    fn create_rejects_same_location_and_foreign_operator() {
        let op = at(Location::A);
        assert_matches!(
            validate_create(&op, Location::A, Location::A, "P", 1),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_create(&at(Location::B), Location::A, Location::B, "P", 1),
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            validate_create(&op, Location::A, Location::B, "P", 0),
            Err(ServiceError::InvalidQuantity(_))
        );
        assert!(validate_create(&op, Location::A, Location::B, "P", 3).is_ok());
    }

    proptest! {
        #[test]
        fn non_positive_overrides_are_rejected(quantity in i32::MIN..=0) {
            let pending = request(TransferStatus::Pending);
            let approved = request(TransferStatus::Approved);
            let op = at(Location::A);

            let approve = plan(&pending, &op, &Transition::Approve { quantity: Some(quantity) });
            prop_assert!(matches!(approve, Err(ServiceError::InvalidQuantity(_))));

            let send = plan(&approved, &op, &Transition::Send { quantity: Some(quantity) });
            prop_assert!(matches!(send, Err(ServiceError::InvalidQuantity(_))));
        }

        #[test]
        fn positive_overrides_become_the_effective_quantity(quantity in 1..=i32::MAX) {
            let approved = request(TransferStatus::Approved);
            let plan = plan(&approved, &at(Location::A), &Transition::Send { quantity: Some(quantity) })
                .unwrap();
            prop_assert_eq!(plan.quantity, Some(quantity));
            prop_assert_eq!(plan.ledger.delta(), Some((Location::A, -quantity)));
        }
    }
}
