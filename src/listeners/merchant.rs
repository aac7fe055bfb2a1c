use serde::{Deserialize, Serialize};

use crate::compose::{messages, ComposeRequest};
use crate::notification::{NotificationType, Recipient, RelatedIds};

use super::{metadata, StateChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerchantStatus {
    Pending,
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantSnapshot {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub owner_email: Option<String>,
    pub status: MerchantStatus,
    #[serde(default)]
    pub verified: bool,
    /// Set by moderation on suspension
    #[serde(default)]
    pub status_reason: Option<String>,
}

impl MerchantSnapshot {
    fn is_approved(&self) -> bool {
        self.status == MerchantStatus::Active && self.verified
    }
}

/// Owner notification for a change of `status` or `verified`.
///
/// Becoming active and verified from any other combination approves, so a
/// suspended merchant restored to active also hears about it.
pub fn plan_change(change: &StateChange<MerchantSnapshot>) -> Option<ComposeRequest> {
    let (previous, merchant) = change.pair()?;

    let (notification_type, message) = if merchant.is_approved() && !previous.is_approved() {
        (
            NotificationType::MerchantApproved,
            messages::merchant_approved(&merchant.name),
        )
    } else if merchant.status == MerchantStatus::Suspended
        && previous.status != MerchantStatus::Suspended
    {
        (
            NotificationType::MerchantSuspended,
            messages::merchant_suspended(&merchant.name, merchant.status_reason.as_deref()),
        )
    } else if previous.status == MerchantStatus::Active
        && merchant.status == MerchantStatus::Inactive
    {
        (
            NotificationType::MerchantDeactivated,
            messages::merchant_deactivated(&merchant.name),
        )
    } else {
        return None;
    };

    Some(
        ComposeRequest::from_message(
            Recipient::new(&merchant.owner_id, merchant.owner_email.clone()),
            notification_type,
            message,
        )
        .with_related(RelatedIds::merchant(&merchant.id))
        .with_metadata(metadata(&[
            ("merchant_name", Some(merchant.name.as_str())),
            ("reason", merchant.status_reason.as_deref()),
        ])),
    )
}
