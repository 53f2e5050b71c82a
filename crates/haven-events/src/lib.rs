//! # haven-events
//!
//! Decoupled publish/subscribe core for haven.
//!
//! - [`EventDispatcher`] -- explicitly constructed dispatcher owned by the
//!   composition root; handlers run in priority order with per-handler
//!   retry/backoff and timeouts
//! - [`EventHandler`] / [`handler_fn`] -- subscriber interface
//! - [`HandlerOptions`] / [`RetryPolicy`] -- registration options
//! - [`HistoryFilter`] -- history queries against the bounded ring buffer

pub mod dispatcher;
pub mod handler;
pub mod history;
pub mod retry;

pub use dispatcher::{DispatcherStats, EventDispatcher, HandlerId, PublishOptions};
pub use handler::{handler_fn, EventHandler, HandlerOptions, HandlerResult, RetryPolicy};
pub use history::HistoryFilter;
