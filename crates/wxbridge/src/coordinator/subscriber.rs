use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::weather::WeatherSnapshot;

/// Consumer of published snapshots.
///
/// Called synchronously on the refresh path, in registration order; keep it cheap.
pub trait Subscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn on_snapshot(&self, snapshot: &Arc<WeatherSnapshot>);
}

/// Handle returned by `Coordinator::register`; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}
