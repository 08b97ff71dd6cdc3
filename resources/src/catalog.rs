//! Preset configurations for the admin console's resources.
//!
//! Paths are the console's defaults; every field can be overridden with
//! the [`ResourceConfig`] builder methods.

use crate::config::{PagingStyle, ResourceConfig};
use crate::transport::Method;

/// Registered platform users
#[must_use]
pub fn users() -> ResourceConfig {
    ResourceConfig::new("users", "/admin/users")
        .with_display_name("User")
        .with_validation_message("invalid user data")
}

/// Beats listed for sale
#[must_use]
pub fn beats() -> ResourceConfig {
    ResourceConfig::new("beats", "/admin/beats").with_display_name("Beat")
}

/// Purchases of beats
#[must_use]
pub fn beat_purchases() -> ResourceConfig {
    ResourceConfig::new("purchases", "/admin/beat-purchases")
        .with_display_name("Beat purchase")
        .with_validation_message("invalid purchase status")
}

/// Audio posts in the feed
#[must_use]
pub fn audio_posts() -> ResourceConfig {
    ResourceConfig::new("posts", "/admin/audio-posts")
        .with_display_name("Audio post")
        .with_removed_message("Audio post removed")
}

/// Withdrawal requests awaiting approval
#[must_use]
pub fn withdrawals() -> ResourceConfig {
    ResourceConfig::new("withdrawals", "/admin/withdrawals")
        .with_display_name("Withdrawal")
        .with_validation_message("invalid status value")
        .with_updated_message("Withdrawal status updated")
}

/// Wallet deposits
#[must_use]
pub fn deposits() -> ResourceConfig {
    ResourceConfig::new("deposits", "/admin/deposits").with_display_name("Deposit")
}

/// Paid subscriptions
#[must_use]
pub fn subscriptions() -> ResourceConfig {
    ResourceConfig::new("subscriptions", "/admin/subscriptions")
        .with_display_name("Subscription")
}

/// Music distribution requests, paged by page number
#[must_use]
pub fn distribution_requests() -> ResourceConfig {
    ResourceConfig::new("requests", "/admin/distribution/requests")
        .with_display_name("Distribution request")
        .with_paging(PagingStyle::page())
        .with_mutate_method(Method::Put)
        .with_validation_message("invalid distribution status")
}

/// Promotion campaigns, paged by page number
#[must_use]
pub fn promotions() -> ResourceConfig {
    ResourceConfig::new("promotions", "/admin/promotions")
        .with_display_name("Promotion")
        .with_paging(PagingStyle::page())
}

/// Every preset, in menu order
#[must_use]
pub fn all() -> Vec<ResourceConfig> {
    vec![
        users(),
        beats(),
        beat_purchases(),
        audio_posts(),
        withdrawals(),
        deposits(),
        subscriptions(),
        distribution_requests(),
        promotions(),
    ]
}

/// Look up a preset by its list path's last segment or its key
///
/// `"beat-purchases"` and `"purchases"` both find [`beat_purchases`].
#[must_use]
pub fn by_name(name: &str) -> Option<ResourceConfig> {
    all().into_iter().find(|config| {
        config.name == name || config.list_path.rsplit('/').next() == Some(name)
    })
}
