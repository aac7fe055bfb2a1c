use serde::{Deserialize, Serialize};

use crate::compose::{messages, ComposeRequest};
use crate::notification::{NotificationType, Recipient, RelatedIds};

use super::{metadata, StateChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Contacted,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    /// Display-formatted total, e.g. "150.00"
    pub total_amount: String,
    pub buyer_id: String,
    #[serde(default)]
    pub buyer_email: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub merchant_owner_id: Option<String>,
    #[serde(default)]
    pub merchant_owner_email: Option<String>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
}

impl OrderSnapshot {
    fn related(&self) -> RelatedIds {
        let related = RelatedIds::order(&self.id);
        match &self.merchant_id {
            Some(merchant_id) => related.with_merchant(merchant_id),
            None => related,
        }
    }

    fn buyer(&self) -> Recipient {
        Recipient::new(&self.buyer_id, self.buyer_email.clone())
    }

    fn merchant_display_name(&self) -> &str {
        self.merchant_name.as_deref().unwrap_or("The merchant")
    }
}

/// ORDER_CREATED for the buyer, MERCHANT_NEW_ORDER for the merchant owner
/// when one is known.
pub fn plan_created(order: &OrderSnapshot) -> Vec<ComposeRequest> {
    let mut requests = vec![ComposeRequest::from_message(
        order.buyer(),
        NotificationType::OrderCreated,
        messages::order_created(&order.order_number, &order.total_amount),
    )
    .with_related(order.related())
    .with_metadata(metadata(&[
        ("order_number", Some(order.order_number.as_str())),
        ("total_amount", Some(order.total_amount.as_str())),
        ("merchant_name", order.merchant_name.as_deref()),
    ]))];

    if let Some(owner_id) = &order.merchant_owner_id {
        requests.push(
            ComposeRequest::from_message(
                Recipient::new(owner_id, order.merchant_owner_email.clone()),
                NotificationType::MerchantNewOrder,
                messages::merchant_new_order(
                    &order.order_number,
                    &order.total_amount,
                    order.buyer_name.as_deref(),
                ),
            )
            .with_related(order.related())
            .with_metadata(metadata(&[
                ("order_number", Some(order.order_number.as_str())),
                ("total_amount", Some(order.total_amount.as_str())),
                ("buyer_name", order.buyer_name.as_deref()),
            ])),
        );
    }

    requests
}

/// Buyer notification for a status transition, if the transition is one
/// the buyer hears about.
pub fn plan_status_change(change: &StateChange<OrderSnapshot>) -> Option<ComposeRequest> {
    let (previous, order) = change.pair()?;
    if previous.status == order.status {
        return None;
    }

    let (notification_type, message) = match (previous.status, order.status) {
        (OrderStatus::New, OrderStatus::Contacted) => (
            NotificationType::OrderContacted,
            messages::order_contacted(&order.order_number, order.merchant_display_name()),
        ),
        (_, OrderStatus::Confirmed) => (
            NotificationType::OrderConfirmed,
            messages::order_confirmed(&order.order_number),
        ),
        (_, OrderStatus::Completed) => (
            NotificationType::OrderCompleted,
            messages::order_completed(&order.order_number),
        ),
        (_, OrderStatus::Cancelled) => (
            NotificationType::OrderCancelled,
            messages::order_cancelled(&order.order_number, order.cancel_reason.as_deref()),
        ),
        _ => return None,
    };

    Some(
        ComposeRequest::from_message(order.buyer(), notification_type, message)
            .with_related(order.related())
            .with_metadata(metadata(&[
                ("order_number", Some(order.order_number.as_str())),
                ("total_amount", Some(order.total_amount.as_str())),
                ("merchant_name", order.merchant_name.as_deref()),
                ("reason", order.cancel_reason.as_deref()),
            ])),
    )
}
