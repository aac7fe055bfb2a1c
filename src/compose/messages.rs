//! Deterministic titles and bodies for marketplace events.

/// Rendered title and body for one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub body: String,
}

impl Message {
    fn new(title: &str, body: String) -> Self {
        Self {
            title: title.to_string(),
            body,
        }
    }
}

fn with_reason(mut body: String, reason: Option<&str>) -> String {
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        body.push_str(" Reason: ");
        body.push_str(reason);
    }
    body
}

pub fn order_created(order_number: &str, total_amount: &str) -> Message {
    Message::new(
        "Order Placed Successfully",
        format!(
            "Your order {} has been placed successfully. Total: {}. The merchant will contact you soon.",
            order_number, total_amount
        ),
    )
}

pub fn order_contacted(order_number: &str, merchant_name: &str) -> Message {
    Message::new(
        "Merchant Contacted",
        format!(
            "{} has reviewed your order {} and will be in touch with you shortly.",
            merchant_name, order_number
        ),
    )
}

pub fn order_confirmed(order_number: &str) -> Message {
    Message::new(
        "Order Confirmed",
        format!("Your order {} has been confirmed by the merchant.", order_number),
    )
}

pub fn order_completed(order_number: &str) -> Message {
    Message::new(
        "Order Completed",
        format!(
            "Your order {} has been completed. Thank you for shopping with us!",
            order_number
        ),
    )
}

pub fn order_cancelled(order_number: &str, reason: Option<&str>) -> Message {
    Message::new(
        "Order Cancelled",
        with_reason(format!("Your order {} has been cancelled.", order_number), reason),
    )
}

pub fn merchant_new_order(order_number: &str, total_amount: &str, buyer_name: Option<&str>) -> Message {
    let body = match buyer_name {
        Some(buyer) => format!(
            "You have received a new order {} from {}. Total: {}.",
            order_number, buyer, total_amount
        ),
        None => format!(
            "You have received a new order {}. Total: {}.",
            order_number, total_amount
        ),
    };
    Message::new("New Order Received", body)
}

pub fn merchant_approved(merchant_name: &str) -> Message {
    Message::new(
        "Merchant Account Approved",
        format!(
            "Congratulations! Your merchant account {} has been approved and verified. You can now start listing products.",
            merchant_name
        ),
    )
}

pub fn merchant_deactivated(merchant_name: &str) -> Message {
    Message::new(
        "Merchant Account Deactivated",
        format!(
            "Your merchant account {} has been deactivated. Your listings are no longer visible to buyers.",
            merchant_name
        ),
    )
}

pub fn merchant_suspended(merchant_name: &str, reason: Option<&str>) -> Message {
    Message::new(
        "Merchant Account Suspended",
        with_reason(
            format!("Your merchant account {} has been suspended.", merchant_name),
            reason,
        ),
    )
}

pub fn listing_approved(listing_title: &str) -> Message {
    Message::new(
        "Listing Approved",
        format!(
            "Your listing \"{}\" has been approved and is now visible to buyers.",
            listing_title
        ),
    )
}

pub fn listing_rejected(listing_title: &str, reason: Option<&str>) -> Message {
    Message::new(
        "Listing Rejected",
        with_reason(
            format!("Your listing \"{}\" has been rejected.", listing_title),
            reason,
        ),
    )
}
