//! Push-style state updates for live subscribers.

mod broadcaster;
mod snapshot;

pub use broadcaster::{Subscription, UpdateBroadcaster};
pub use snapshot::{StateSnapshot, UpdateMessage};
