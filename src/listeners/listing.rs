use serde::{Deserialize, Serialize};

use crate::compose::{messages, ComposeRequest};
use crate::notification::{NotificationType, Recipient, RelatedIds};

use super::{metadata, StateChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub id: String,
    pub title: String,
    pub owner_id: String,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    pub status: ListingStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

pub fn plan_change(change: &StateChange<ListingSnapshot>) -> Option<ComposeRequest> {
    let (previous, listing) = change.pair()?;
    if previous.status == listing.status {
        return None;
    }

    let (notification_type, message) = match listing.status {
        ListingStatus::Approved => (
            NotificationType::ListingApproved,
            messages::listing_approved(&listing.title),
        ),
        ListingStatus::Rejected => (
            NotificationType::ListingRejected,
            messages::listing_rejected(&listing.title, listing.rejection_reason.as_deref()),
        ),
        ListingStatus::Pending => return None,
    };

    let related = RelatedIds::listing(&listing.id);
    let related = match &listing.merchant_id {
        Some(merchant_id) => related.with_merchant(merchant_id),
        None => related,
    };

    Some(
        ComposeRequest::from_message(
            Recipient::new(&listing.owner_id, listing.owner_email.clone()),
            notification_type,
            message,
        )
        .with_related(related)
        .with_metadata(metadata(&[
            ("listing_title", Some(listing.title.as_str())),
            ("reason", listing.rejection_reason.as_deref()),
        ])),
    )
}
