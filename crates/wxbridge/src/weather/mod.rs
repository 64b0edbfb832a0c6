//! Upstream weather data: fetching, translation and snapshot assembly.

pub mod builder;
pub mod gateway;
pub mod location;
pub mod snapshot;
pub mod translate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::build;
pub use builder::FetchResults;
pub use gateway::BaiduGateway;
pub use gateway::EndpointKind;
pub use gateway::FetchError;
pub use gateway::RawPayload;
pub use gateway::WeatherGateway;
pub use location::AdminCode;
pub use location::LocationDescriptor;
pub use snapshot::WeatherSnapshot;
