//! Change notifications for stored keys.
//!
//! Every mutating storage operation dispatches a [`StorageEvent`] through an
//! [`EventBus`]. Consumers either register a callback, which runs
//! synchronously before the mutating call returns, or open a bounded channel
//! and drain it at their own pace.
//!
//! # Example
//!
//! ```ignore
//! let bus = Arc::new(EventBus::new());
//!
//! let listener = bus.listen(|event| println!("{} changed", event.key));
//! bus.dispatch(&StorageEvent::written("theme", "\"dark\""));
//!
//! // Unregisters the callback
//! drop(listener);
//! ```

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{EventReceiver, Listener};
