//! Preference resolver.
//!
//! Decides which channels a notification for a given user and category is
//! delivered on. In-app is always included; push additionally needs at least
//! one registered device token, and silently drops out when there is none.

use std::sync::Arc;

use crate::notification::{Channel, NotificationCategory, UserPreference};
use crate::store::{NotificationStore, StoreError};

/// Channels selected for one notification, with the push fan-out targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannels {
    /// Ordered: email, push, in-app
    pub channels: Vec<Channel>,
    pub device_tokens: Vec<String>,
}

impl ResolvedChannels {
    pub fn contains(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

/// Channel selection for a loaded preference record.
pub fn select_channels(pref: &UserPreference, category: NotificationCategory) -> Vec<Channel> {
    let mut channels = Vec::with_capacity(3);

    if pref.email_enabled && pref.category_enabled(Channel::Email, category) {
        channels.push(Channel::Email);
    }

    if pref.push_enabled
        && pref.category_enabled(Channel::Push, category)
        && !pref.device_tokens.is_empty()
    {
        channels.push(Channel::Push);
    }

    channels.push(Channel::InApp);
    channels
}

pub struct PreferenceResolver {
    store: Arc<dyn NotificationStore>,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Load (or lazily create) the user's preferences and select channels.
    pub async fn resolve(
        &self,
        user_id: &str,
        category: NotificationCategory,
    ) -> Result<ResolvedChannels, StoreError> {
        let pref = self.store.get_or_create_preference(user_id).await?;
        let channels = select_channels(&pref, category);

        if pref.push_enabled
            && pref.category_enabled(Channel::Push, category)
            && pref.device_tokens.is_empty()
        {
            tracing::debug!(user_id, "Push enabled but no device tokens registered, skipping push");
        }

        let device_tokens = if channels.contains(&Channel::Push) {
            pref.device_tokens
        } else {
            Vec::new()
        };

        Ok(ResolvedChannels {
            channels,
            device_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::PreferenceUpdate;
    use crate::store::MemoryNotificationStore;

    #[test]
    fn test_all_channels_with_token() {
        let mut pref = UserPreference::new("user-1");
        pref.add_device_token("tok-1");

        let channels = select_channels(&pref, NotificationCategory::OrderUpdates);
        assert_eq!(channels, vec![Channel::Email, Channel::Push, Channel::InApp]);
    }

    #[test]
    fn test_push_dropped_without_tokens() {
        let pref = UserPreference::new("user-1");
        let channels = select_channels(&pref, NotificationCategory::OrderUpdates);
        assert_eq!(channels, vec![Channel::Email, Channel::InApp]);
    }

    #[test]
    fn test_category_toggles() {
        let mut pref = UserPreference::new("user-1");
        pref.add_device_token("tok-1");
        pref.merchant_updates_email = false;
        pref.merchant_updates_push = false;

        let channels = select_channels(&pref, NotificationCategory::MerchantUpdates);
        assert_eq!(channels, vec![Channel::InApp]);

        let channels = select_channels(&pref, NotificationCategory::OrderUpdates);
        assert_eq!(channels, vec![Channel::Email, Channel::Push, Channel::InApp]);
    }

    #[test]
    fn test_in_app_always_included() {
        let mut pref = UserPreference::new("user-1");
        pref.email_enabled = false;
        pref.push_enabled = false;

        for category in [
            NotificationCategory::OrderUpdates,
            NotificationCategory::MerchantUpdates,
            NotificationCategory::Marketing,
        ] {
            assert_eq!(select_channels(&pref, category), vec![Channel::InApp]);
        }
    }

    #[tokio::test]
    async fn test_resolve_creates_default_preference() {
        let store = Arc::new(MemoryNotificationStore::new());
        let resolver = PreferenceResolver::new(store.clone());

        let resolved = resolver
            .resolve("user-1", NotificationCategory::OrderUpdates)
            .await
            .unwrap();
        assert_eq!(resolved.channels, vec![Channel::Email, Channel::InApp]);
        assert!(resolved.device_tokens.is_empty());

        let pref = store.get_or_create_preference("user-1").await.unwrap();
        assert!(pref.email_enabled);
    }

    #[tokio::test]
    async fn test_resolve_returns_tokens_only_with_push() {
        let store = Arc::new(MemoryNotificationStore::new());
        store.add_device_token("user-1", "tok-a").await.unwrap();
        store.add_device_token("user-1", "tok-b").await.unwrap();
        let resolver = PreferenceResolver::new(store.clone());

        let resolved = resolver
            .resolve("user-1", NotificationCategory::OrderUpdates)
            .await
            .unwrap();
        assert!(resolved.contains(Channel::Push));
        assert_eq!(resolved.device_tokens, vec!["tok-a", "tok-b"]);

        store
            .update_preference(
                "user-1",
                &PreferenceUpdate {
                    push_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let resolved = resolver
            .resolve("user-1", NotificationCategory::OrderUpdates)
            .await
            .unwrap();
        assert!(!resolved.contains(Channel::Push));
        assert!(resolved.device_tokens.is_empty());
    }
}
