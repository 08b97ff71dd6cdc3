//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` variants inside
//! reducers.

/// Create an `Effect::Future` from an async block body
///
/// # Example
///
/// ```rust,ignore
/// use resource_sync_core::async_effect;
///
/// async_effect! {
///     let response = transport.send(request).await;
///     Some(ResourceAction::FetchCompleted { request_id, result })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use resource_sync_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(3),
///     action: ResourceAction::NoticeExpired { generation: 4 }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create an `Effect::Cancellable` keyed by a static id
///
/// # Example
///
/// ```rust,ignore
/// use resource_sync_core::{cancellable, delay};
///
/// cancellable! {
///     id: "notice",
///     effect: delay! { duration: ttl, action: ResourceAction::NoticeExpired { generation } }
/// }
/// ```
#[macro_export]
macro_rules! cancellable {
    (
        id: $id:expr,
        effect: $effect:expr
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $crate::effect::EffectId::new($id),
            effect: ::std::boxed::Box::new($effect),
        }
    };
}
