//! odsync Events - the change event bus
//!
//! Lifecycle hooks of the relational layer describe committed transitions as
//! [`ChangeEvent`]s and hand them to an [`EventBus`]. Registered
//! [`Handler`]s react synchronously, usually by enqueueing graph and search
//! work.
//!
//! # Example
//!
//! ```rust,ignore
//! use odsync_events::{ChangeEvent, EventBus, Operation, Subscription};
//!
//! let bus = EventBus::new();
//! bus.subscribe_fn("log", Subscription::all(), |event| {
//!     println!("{} {}", event.entity(), event.operation());
//!     Ok(())
//! });
//! bus.publish_robust(&ChangeEvent::new(dataset, Operation::Published));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{
    DispatchMode, DispatchReport, EventBus, FnHandler, Handler, Subscription, SubscriptionId,
};
pub use error::{EventError, HandlerError};
pub use event::{ChangeEvent, Operation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
