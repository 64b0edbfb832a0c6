//! Choosing a location: the upstream district table and a stepwise setup flow.

mod districts;
mod flow;

pub use districts::DistrictTable;
pub use districts::DistrictTableError;
pub use flow::LocationSetup;
pub use flow::SetupError;
pub use flow::SetupMode;
