//! Transient notices with a single cancellable expiry timer.
//!
//! The timer is an [`Effect::Delay`] registered under [`NOTICE_TIMER`], so
//! showing a new notice replaces the pending timer in the store instead of
//! stacking a second one. Each show bumps a generation counter and the timer
//! carries the generation it was armed for; an expiry that lost a race with
//! a later show or reset finds a different generation and does nothing.

use chrono::{DateTime, Utc};
use resource_sync_core::delay;
use resource_sync_core::effect::{Effect, EffectId};
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// Key of the notice timer in the store's cancellation registry
pub const NOTICE_TIMER: EffectId = EffectId::new("notice-timer");

/// Tone of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
}

/// A notice currently on screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Success or error
    pub kind: NoticeKind,
    /// Text shown to the operator
    pub message: String,
    /// When the timer will clear it
    pub expires_at: DateTime<Utc>,
}

/// The single notice slot of a controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeSlot {
    current: Option<Notice>,
    generation: u64,
}

impl NoticeSlot {
    /// The visible notice
    #[must_use]
    pub const fn current(&self) -> Option<&Notice> {
        self.current.as_ref()
    }

    /// Generation of the latest show or reset
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Show a notice and arm its timer
    ///
    /// `expired` builds the action the timer delivers from the new
    /// generation. The returned effect replaces any pending timer.
    pub fn show<A, F>(
        &mut self,
        kind: NoticeKind,
        message: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
        expired: F,
    ) -> Effect<A>
    where
        F: FnOnce(u64) -> A,
    {
        self.generation += 1;
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now);
        self.current = Some(Notice {
            kind,
            message: message.into(),
            expires_at,
        });

        let timer = delay! {
            duration: ttl,
            action: expired(self.generation)
        };
        timer.cancellable(NOTICE_TIMER)
    }

    /// Clear the notice now and cancel its timer
    pub fn reset<A>(&mut self) -> Effect<A> {
        self.generation += 1;
        self.current = None;
        Effect::Cancel(NOTICE_TIMER)
    }

    /// Handle a timer firing; returns whether the notice was cleared
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation == self.generation && self.current.is_some() {
            self.current = None;
            true
        } else {
            false
        }
    }
}

impl Serialize for NoticeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.current.serialize(serializer)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use resource_sync_core::environment::Clock;
    use resource_sync_testing::test_clock;

    #[derive(Debug, Clone, PartialEq)]
    struct Expired(u64);

    #[test]
    fn show_arms_a_keyed_timer() {
        let now = test_clock().now();
        let mut slot = NoticeSlot::default();
        let effect = slot.show(NoticeKind::Success, "saved", Duration::from_secs(3), now, Expired);

        let notice = slot.current().cloned();
        assert_eq!(notice.as_ref().map(|n| n.message.as_str()), Some("saved"));
        assert_eq!(
            notice.map(|n| n.expires_at),
            Some(now + chrono::Duration::seconds(3))
        );

        match effect {
            Effect::Cancellable { id, effect } => {
                assert_eq!(id, NOTICE_TIMER);
                assert!(matches!(
                    *effect,
                    Effect::Delay { duration, ref action }
                        if duration == Duration::from_secs(3) && **action == Expired(1)
                ));
            },
            other => panic!("expected cancellable timer, got {other:?}"),
        }
    }

    #[test]
    fn stale_expiry_is_ignored() {
        let now = test_clock().now();
        let mut slot = NoticeSlot::default();
        let _ = slot.show::<Expired, _>(NoticeKind::Success, "first", Duration::from_secs(3), now, Expired);
        let _ = slot.show::<Expired, _>(NoticeKind::Error, "second", Duration::from_secs(3), now, Expired);

        assert!(!slot.expire(1));
        assert_eq!(slot.current().map(|n| n.kind), Some(NoticeKind::Error));
        assert!(slot.expire(2));
        assert!(slot.current().is_none());
        assert!(!slot.expire(2));
    }

    #[test]
    fn reset_clears_and_cancels() {
        let now = test_clock().now();
        let mut slot = NoticeSlot::default();
        let _ = slot.show::<Expired, _>(NoticeKind::Success, "x", Duration::from_secs(3), now, Expired);
        let effect: Effect<Expired> = slot.reset();

        assert!(matches!(effect, Effect::Cancel(ref id) if *id == NOTICE_TIMER));
        assert!(slot.current().is_none());
        assert!(!slot.expire(1));
    }

    #[test]
    fn serializes_as_the_visible_notice() {
        let mut slot = NoticeSlot::default();
        assert_eq!(serde_json::to_value(&slot).ok(), Some(serde_json::Value::Null));
        let _ = slot.show::<Expired, _>(
            NoticeKind::Error,
            "failed",
            Duration::from_secs(1),
            test_clock().now(),
            Expired,
        );
        let value = serde_json::to_value(&slot).ok();
        assert_eq!(
            value.as_ref().and_then(|v| v.get("kind")).cloned(),
            Some(serde_json::json!("error"))
        );
    }
}
