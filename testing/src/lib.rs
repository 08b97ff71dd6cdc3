//! # Resource Sync Testing
//!
//! Testing utilities and helpers for reducer-driven resource controllers.
//!
//! This crate provides:
//! - Deterministic clocks
//! - The [`ReducerTest`] Given-When-Then harness
//! - Assertion helpers for effects
//! - A one-line tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use resource_sync_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(ResourceReducer::new())
//!     .with_env(env)
//!     .given_state(ResourceState::new(20))
//!     .when_action(ResourceAction::ResetError)
//!     .then_state(|state| assert!(state.error.is_none()))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use resource_sync_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use resource_sync_testing::mocks::FixedClock;
    /// use resource_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Install a test-friendly tracing subscriber honouring `RUST_LOG`
///
/// Output goes through the test writer so it is captured per test. Calling
/// this more than once is harmless.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
