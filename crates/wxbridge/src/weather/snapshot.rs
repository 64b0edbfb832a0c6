use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Serialize;

use super::gateway::EndpointKind;
use super::translate::AqiCategory;
use super::translate::Condition;
use super::translate::Mapped;
use super::translate::Wind;

/// Where the upstream says the reading comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Place {
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub district_id: Option<String>,
}

/// Current observation in target units (°C, %, hPa, km, km/h).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub condition: Option<Mapped<Condition>>,
    /// Localized condition text as reported upstream.
    pub condition_text: Option<String>,
    pub temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub cloud_coverage: Option<f64>,
    pub visibility: Option<f64>,
    pub uv_index: Option<f64>,
    pub dew_point: Option<f64>,
    pub precipitation_1h: Option<f64>,
    pub wind: Wind,
    /// Observation time reported by the upstream.
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub place: Option<Place>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourlyForecast {
    pub time: Option<DateTime<FixedOffset>>,
    pub condition: Option<Mapped<Condition>>,
    pub condition_text: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub precipitation: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub cloud_coverage: Option<f64>,
    pub uv_index: Option<f64>,
    pub pressure: Option<f64>,
    pub dew_point: Option<f64>,
    pub wind: Wind,
}

/// Daytime or nighttime half of a daily forecast.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HalfDay {
    pub condition: Option<Mapped<Condition>>,
    pub condition_text: Option<String>,
    pub wind: Wind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyForecast {
    pub date: Option<NaiveDate>,
    /// Local midnight of `date`.
    pub datetime: Option<DateTime<FixedOffset>>,
    pub week: Option<String>,
    pub temperature_high: Option<f64>,
    pub temperature_low: Option<f64>,
    pub day: HalfDay,
    pub night: HalfDay,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub level: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Air quality in µg/m³, CO in mg/m³.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQuality {
    pub aqi: f64,
    pub category: Mapped<AqiCategory>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub o3: Option<f64>,
    pub co: Option<f64>,
}

/// One consistent view of all upstream data.
///
/// Built only by [`super::builder::build`] and never mutated afterwards; a refresh
/// produces a new snapshot that replaces the old one wholesale. A section is `None`
/// when it has never been fetched successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    pub(crate) current: Option<CurrentConditions>,
    pub(crate) hourly: Option<Vec<HourlyForecast>>,
    pub(crate) daily: Option<Vec<DailyForecast>>,
    pub(crate) alerts: Option<Vec<Alert>>,
    pub(crate) air_quality: Option<AirQuality>,
    pub(crate) fetched_at: DateTime<Utc>,
    pub(crate) partial_failures: BTreeSet<EndpointKind>,
}

impl WeatherSnapshot {
    pub fn current(&self) -> Option<&CurrentConditions> {
        self.current.as_ref()
    }

    /// Up to 24 entries in chronological order.
    pub fn hourly(&self) -> Option<&[HourlyForecast]> {
        self.hourly.as_deref()
    }

    /// Up to 7 entries, today first.
    pub fn daily(&self) -> Option<&[DailyForecast]> {
        self.daily.as_deref()
    }

    /// Alerts in upstream order; the first is the primary one.
    pub fn alerts(&self) -> Option<&[Alert]> {
        self.alerts.as_deref()
    }

    pub fn air_quality(&self) -> Option<&AirQuality> {
        self.air_quality.as_ref()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Endpoints whose section was carried over (or left empty) this cycle.
    pub fn partial_failures(&self) -> &BTreeSet<EndpointKind> {
        &self.partial_failures
    }

    /// Whether the section for `kind` failed to refresh in the cycle that built this snapshot.
    pub fn is_stale(&self, kind: EndpointKind) -> bool {
        self.partial_failures.contains(&kind)
    }
}
