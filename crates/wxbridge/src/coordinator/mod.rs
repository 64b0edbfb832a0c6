//! Refresh lifecycle and snapshot publication.

mod backoff;
#[allow(clippy::module_inception)]
mod coordinator;
mod subscriber;

pub use backoff::BackoffPolicy;
pub use coordinator::Coordinator;
pub use coordinator::CoordinatorStatus;
pub use coordinator::Phase;
pub use subscriber::Subscriber;
pub use subscriber::SubscriberId;
