#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod entities;
pub mod secret;
pub mod setup;
pub mod weather;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::ConfigError;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use coordinator::Coordinator;
pub use entities::EntitySet;
pub use secret::ApiKey;
pub use weather::BaiduGateway;
pub use weather::LocationDescriptor;
pub use weather::WeatherSnapshot;
