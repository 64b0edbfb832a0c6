use std::collections::BTreeMap;
use std::collections::HashMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::format_diagnostics;
use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::FieldLocation;
use super::diagnostics::LoadError;
use super::diagnostics::ValidationError;
use super::partial::PartialApiConfig;
use super::partial::PartialConfig;
use super::partial::PartialLocation;
use super::partial::PartialLoggingConfig;
use super::partial::PartialWeatherConfig;
use crate::secret::ApiKey;
use crate::weather::AdminCode;
use crate::weather::LocationDescriptor;

pub const MIN_UPDATE_INTERVAL_SECONDS: i64 = 300;
pub const MAX_UPDATE_INTERVAL_SECONDS: i64 = 7200;
pub const DEFAULT_UPDATE_INTERVAL_SECONDS: i64 = 900;

pub const DEFAULT_NAME: &str = "Baidu Weather";
pub const DEFAULT_LISTEN: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 8565;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub weather: WeatherConfig,
    pub api: ApiConfig,
}

// Deserialize is needed for Spanned<LogLevel> in the partial config
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"wxbridge::weather" = "debug"`
    pub overrides: BTreeMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Target filter for the fmt subscriber.
    pub fn filter(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherConfig {
    /// Display name; entity ids are derived from it
    pub name: String,

    /// Serialized masked
    pub api_key: ApiKey,

    pub update_interval_seconds: i64,

    pub location: LocationDescriptor,
}

impl WeatherConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds.unsigned_abs())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: DEFAULT_LISTEN,
            port: DEFAULT_PORT,
        }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Merge or validation errors, already rendered for the terminal
    #[error("{rendered}")]
    Invalid {
        rendered: String,
        diagnostics: Vec<Diagnostic>,
    },
}

/// Collects validation errors, attaching the definition site of each field.
struct Validator<'a> {
    origins: &'a HashMap<String, FieldLocation>,
    errors: Vec<ValidationError>,
}

impl Validator<'_> {
    fn error(&mut self, field_path: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field_path: field_path.to_string(),
            message: message.into(),
            location: self.origins.get(field_path).cloned(),
        });
    }

    fn logging(&mut self, partial: Option<PartialLoggingConfig>) -> LoggingConfig {
        let Some(partial) = partial else {
            return LoggingConfig::default();
        };
        LoggingConfig {
            level: partial.level.map(|s| *s.get_ref()).unwrap_or_default(),
            overrides: partial
                .overrides
                .unwrap_or_default()
                .into_iter()
                .map(|(target, level)| (target, level.into_inner()))
                .collect(),
        }
    }

    fn weather(&mut self, partial: Option<PartialWeatherConfig>) -> Option<WeatherConfig> {
        let partial = partial.unwrap_or_default();

        let name = match partial.name.map(|s| s.into_inner()) {
            Some(name) if name.trim().is_empty() => {
                self.error("weather.name", "name must not be empty");
                None
            }
            Some(name) => Some(name.trim().to_string()),
            None => Some(DEFAULT_NAME.to_string()),
        };

        let api_key = match partial.api_key.map(|s| s.into_inner()) {
            Some(key) if key.is_blank() => {
                self.error("weather.api_key", "api_key must not be empty");
                None
            }
            Some(key) => Some(key),
            None => {
                self.error("weather.api_key", "api_key is required");
                None
            }
        };

        let interval = partial
            .update_interval_seconds
            .map(|s| *s.get_ref())
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECONDS);
        let interval = if (MIN_UPDATE_INTERVAL_SECONDS..=MAX_UPDATE_INTERVAL_SECONDS)
            .contains(&interval)
        {
            Some(interval)
        } else {
            self.error(
                "weather.update_interval_seconds",
                format!(
                    "update interval must be between {} and {} seconds, got {}",
                    MIN_UPDATE_INTERVAL_SECONDS, MAX_UPDATE_INTERVAL_SECONDS, interval
                ),
            );
            None
        };

        let location = self.location(partial.location.unwrap_or_default());

        Some(WeatherConfig {
            name: name?,
            api_key: api_key?,
            update_interval_seconds: interval?,
            location: location?,
        })
    }

    fn location(&mut self, partial: PartialLocation) -> Option<LocationDescriptor> {
        let has_admin = partial.province.is_some()
            || partial.city.is_some()
            || partial.district.is_some()
            || partial.district_id.is_some();
        let has_coordinates = partial.latitude.is_some() || partial.longitude.is_some();

        match (has_admin, has_coordinates) {
            (true, true) => {
                let field = if partial.latitude.is_some() {
                    "weather.location.latitude"
                } else {
                    "weather.location.longitude"
                };
                self.error(
                    field,
                    "location must be either district_id or latitude/longitude, not both",
                );
                None
            }
            (false, false) => {
                self.error(
                    "weather.location",
                    "location is required: set district_id or latitude and longitude",
                );
                None
            }
            (true, false) => self.district(partial),
            (false, true) => self.coordinates(partial),
        }
    }

    fn district(&mut self, partial: PartialLocation) -> Option<LocationDescriptor> {
        let Some(district_id) = partial.district_id.map(|s| s.into_inner()) else {
            self.error(
                "weather.location.district_id",
                "district_id is required when naming a district",
            );
            return None;
        };
        if district_id.len() != 6 || !district_id.bytes().all(|b| b.is_ascii_digit()) {
            self.error(
                "weather.location.district_id",
                format!("district_id must be six digits, got '{}'", district_id),
            );
            return None;
        }

        let name = |field: Option<toml::Spanned<String>>| {
            field.map(|s| s.into_inner()).unwrap_or_default()
        };
        Some(LocationDescriptor::District(AdminCode {
            province: name(partial.province),
            city: name(partial.city),
            district: name(partial.district),
            district_id,
        }))
    }

    fn coordinates(&mut self, partial: PartialLocation) -> Option<LocationDescriptor> {
        let latitude = partial.latitude.map(|s| *s.get_ref());
        let longitude = partial.longitude.map(|s| *s.get_ref());

        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            if latitude.is_some() {
                self.error("weather.location.latitude", "latitude requires longitude");
            } else {
                self.error("weather.location.longitude", "longitude requires latitude");
            }
            return None;
        };

        let mut valid = true;
        if !(-90.0..=90.0).contains(&latitude) {
            self.error(
                "weather.location.latitude",
                format!("latitude must be between -90 and 90, got {}", latitude),
            );
            valid = false;
        }
        if !(-180.0..=180.0).contains(&longitude) {
            self.error(
                "weather.location.longitude",
                format!("longitude must be between -180 and 180, got {}", longitude),
            );
            valid = false;
        }

        valid.then_some(LocationDescriptor::Coordinates {
            latitude,
            longitude,
        })
    }

    fn api(&mut self, partial: Option<PartialApiConfig>) -> ApiConfig {
        let partial = partial.unwrap_or_default();
        let defaults = ApiConfig::default();

        let listen = match partial.listen.map(|s| s.into_inner()) {
            Some(listen) => listen.parse().unwrap_or_else(|_| {
                self.error(
                    "api.listen",
                    format!("'{}' is not an IP address", listen),
                );
                defaults.listen
            }),
            None => defaults.listen,
        };

        ApiConfig {
            enabled: partial.enabled.map(|s| *s.get_ref()).unwrap_or(defaults.enabled),
            listen,
            port: partial.port.map(|s| *s.get_ref()).unwrap_or(defaults.port),
        }
    }
}

impl Config {
    /// Load configuration from one or more TOML files with import resolution
    ///
    /// Supports splitting the config across files (e.g. base + secrets) and
    /// `imports` within files. Every merge conflict and validation error is
    /// reported together.
    ///
    /// Returns the config and any warnings; errors fail the whole load.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;

        // Merge with first-wins semantics, collecting diagnostics
        let (partial, diagnostics) = PartialConfig::merge(configs);

        Self::from_partial(partial, diagnostics)
    }

    /// Convert a merged PartialConfig to a Config, validating all fields
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let mut validator = Validator {
            origins: &partial.origins,
            errors: Vec::new(),
        };

        let logging = validator.logging(partial.logging);
        let weather = validator.weather(partial.weather);
        let api = validator.api(partial.api);

        diagnostics.extend(
            validator
                .errors
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e))),
        );

        match weather {
            Some(weather) if !diagnostics.iter().any(Diagnostic::is_error) => Ok((
                Config {
                    logging,
                    weather,
                    api,
                },
                diagnostics,
            )),
            _ => Err(ConfigError::Invalid {
                rendered: format_diagnostics(&diagnostics),
                diagnostics,
            }),
        }
    }
}
