//! Weather entity: current conditions plus forecasts in host units.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use serde_json::Value;

use super::entity::base_attributes;
use super::entity::insert_some;
use super::entity::slugify;
use super::entity::Attributes;
use super::entity::Entity;
use super::entity::EntityState;
use crate::coordinator::Subscriber;
use crate::weather::snapshot::DailyForecast;
use crate::weather::snapshot::HourlyForecast;
use crate::weather::translate::Condition;
use crate::weather::translate::Mapped;
use crate::weather::EndpointKind;
use crate::weather::WeatherSnapshot;

/// A single forecast entry (daily or hourly).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// RFC 3339 with the upstream's +08:00 offset.
    pub datetime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templow: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dew_point: Option<f64>,
}

/// Host condition name. Conditions outside the vocabulary show as `exceptional`.
fn condition_name(condition: &Mapped<Condition>) -> String {
    match condition {
        Mapped::Known(c) => c.to_string(),
        Mapped::Unknown { .. } => Condition::Exceptional.to_string(),
    }
}

/// Weather entity that reads the coordinator's snapshot.
pub struct WeatherEntity {
    entity_id: String,
    snapshot: ArcSwapOption<WeatherSnapshot>,
}

impl WeatherEntity {
    pub fn new(name: &str) -> Self {
        Self {
            entity_id: format!("weather.{}", slugify(name)),
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// Daily forecast, today first. `None` when there is no daily data.
    pub fn forecast_daily(&self) -> Option<Vec<Forecast>> {
        let snapshot = self.snapshot.load_full()?;
        let days = snapshot.daily().filter(|d| !d.is_empty())?;
        Some(days.iter().filter_map(daily_forecast).collect())
    }

    /// Hourly forecast in chronological order. `None` when there is no hourly data.
    pub fn forecast_hourly(&self) -> Option<Vec<Forecast>> {
        let snapshot = self.snapshot.load_full()?;
        let hours = snapshot.hourly().filter(|h| !h.is_empty())?;
        Some(hours.iter().filter_map(hourly_forecast).collect())
    }
}

fn daily_forecast(day: &DailyForecast) -> Option<Forecast> {
    Some(Forecast {
        datetime: day.datetime?.to_rfc3339(),
        condition: day.day.condition.as_ref().map(condition_name),
        temperature: day.temperature_high,
        templow: day.temperature_low,
        humidity: None,
        precipitation: None,
        precipitation_probability: None,
        pressure: None,
        wind_speed: day.day.wind.speed_kmh,
        wind_bearing: day.day.wind.bearing,
        cloud_coverage: None,
        uv_index: None,
        dew_point: None,
    })
}

fn hourly_forecast(hour: &HourlyForecast) -> Option<Forecast> {
    Some(Forecast {
        datetime: hour.time?.to_rfc3339(),
        condition: hour.condition.as_ref().map(condition_name),
        temperature: hour.temperature,
        templow: None,
        humidity: hour.humidity,
        precipitation: hour.precipitation,
        precipitation_probability: hour.precipitation_probability,
        pressure: hour.pressure,
        wind_speed: hour.wind.speed_kmh,
        wind_bearing: hour.wind.bearing,
        cloud_coverage: hour.cloud_coverage,
        uv_index: hour.uv_index,
        dew_point: hour.dew_point,
    })
}

fn daily_summary(day: &DailyForecast) -> Value {
    let mut entry = Attributes::new();
    insert_some(&mut entry, "date", day.date.map(|d| d.to_string()));
    insert_some(&mut entry, "condition_day", day.day.condition_text.clone());
    insert_some(&mut entry, "condition_night", day.night.condition_text.clone());
    insert_some(&mut entry, "temperature_high", day.temperature_high);
    insert_some(&mut entry, "temperature_low", day.temperature_low);
    insert_some(&mut entry, "wind_class_day", day.day.wind.class_text());
    insert_some(&mut entry, "wind_direction_day", day.day.wind.direction_text());
    insert_some(&mut entry, "wind_class_night", day.night.wind.class_text());
    insert_some(&mut entry, "wind_direction_night", day.night.wind.direction_text());
    Value::Object(entry)
}

fn hourly_summary(hour: &HourlyForecast) -> Value {
    let mut entry = Attributes::new();
    insert_some(&mut entry, "datetime", hour.time.map(|t| t.to_rfc3339()));
    insert_some(&mut entry, "condition", hour.condition_text.clone());
    insert_some(&mut entry, "temperature", hour.temperature);
    insert_some(&mut entry, "humidity", hour.humidity);
    insert_some(&mut entry, "wind_class", hour.wind.class_text());
    insert_some(&mut entry, "wind_direction", hour.wind.direction_text());
    insert_some(&mut entry, "precipitation", hour.precipitation);
    Value::Object(entry)
}

impl Entity for WeatherEntity {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> &'static str {
        "weather"
    }

    fn state(&self) -> EntityState {
        let Some(snapshot) = self.snapshot.load_full() else {
            return EntityState::Unavailable;
        };
        match snapshot.current().and_then(|c| c.condition.as_ref()) {
            Some(condition) => EntityState::Text(condition_name(condition)),
            None => EntityState::Unknown,
        }
    }

    fn attributes(&self) -> Attributes {
        let snapshot = self.snapshot.load_full();
        let mut attrs = base_attributes(
            snapshot.as_deref(),
            &[EndpointKind::Current, EndpointKind::AirQuality],
        );
        let Some(snapshot) = snapshot else {
            return attrs;
        };

        attrs.insert("temperature_unit".into(), "°C".into());
        attrs.insert("pressure_unit".into(), "hPa".into());
        attrs.insert("wind_speed_unit".into(), "km/h".into());
        attrs.insert("visibility_unit".into(), "km".into());

        if let Some(current) = snapshot.current() {
            insert_some(&mut attrs, "temperature", current.temperature);
            insert_some(&mut attrs, "apparent_temperature", current.apparent_temperature);
            insert_some(&mut attrs, "humidity", current.humidity);
            insert_some(&mut attrs, "pressure", current.pressure);
            insert_some(&mut attrs, "wind_speed", current.wind.speed_kmh);
            insert_some(&mut attrs, "wind_bearing", current.wind.bearing);
            insert_some(&mut attrs, "cloud_coverage", current.cloud_coverage);
            insert_some(&mut attrs, "visibility", current.visibility);
            insert_some(&mut attrs, "dew_point", current.dew_point);
            insert_some(&mut attrs, "uv_index", current.uv_index);
            insert_some(&mut attrs, "precipitation_1h", current.precipitation_1h);
            insert_some(&mut attrs, "condition_cn", current.condition_text.clone());
            insert_some(&mut attrs, "wind_class", current.wind.class_text());
            insert_some(&mut attrs, "wind_direction_cn", current.wind.direction_text());
            insert_some(
                &mut attrs,
                "update_time",
                current.updated_at.map(|t| t.to_rfc3339()),
            );
            if let Some(place) = &current.place {
                insert_some(&mut attrs, "location", place.district.clone());
            }
        }

        if let Some(aq) = snapshot.air_quality() {
            attrs.insert("aqi".into(), aq.aqi.into());
            insert_some(&mut attrs, "pm25", aq.pm25);
            insert_some(&mut attrs, "pm10", aq.pm10);
            insert_some(&mut attrs, "no2", aq.no2);
            insert_some(&mut attrs, "so2", aq.so2);
            insert_some(&mut attrs, "co", aq.co);
            insert_some(&mut attrs, "ozone", aq.o3);
        }

        if let Some(days) = snapshot.daily().filter(|d| !d.is_empty()) {
            let list = days.iter().map(daily_summary).collect();
            attrs.insert("forecast_daily".into(), Value::Array(list));
        }
        if let Some(hours) = snapshot.hourly().filter(|h| !h.is_empty()) {
            let list = hours.iter().map(hourly_summary).collect();
            attrs.insert("forecast_hourly".into(), Value::Array(list));
        }
        if let Some(alerts) = snapshot.alerts().filter(|a| !a.is_empty()) {
            let list = alerts
                .iter()
                .map(|a| serde_json::to_value(a).unwrap_or(Value::Null))
                .collect();
            attrs.insert("alerts".into(), Value::Array(list));
        }

        attrs
    }
}

impl Subscriber for WeatherEntity {
    fn name(&self) -> &str {
        &self.entity_id
    }

    fn on_snapshot(&self, snapshot: &Arc<WeatherSnapshot>) {
        self.snapshot.store(Some(snapshot.clone()));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::weather::build;
    use crate::weather::fixtures;
    use crate::weather::FetchError;

    fn snapshot() -> Arc<WeatherSnapshot> {
        let results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        Arc::new(build(None, &results))
    }

    #[test]
    fn test_unavailable_before_first_snapshot() {
        let entity = WeatherEntity::new("Home");
        assert_eq!(entity.entity_id(), "weather.home");
        assert_eq!(entity.state(), EntityState::Unavailable);
        assert!(entity.forecast_daily().is_none());
        assert_eq!(entity.attributes().len(), 1);
    }

    #[test]
    fn test_state_and_attributes() {
        let entity = WeatherEntity::new("Home");
        entity.on_snapshot(&snapshot());

        assert_eq!(entity.state(), EntityState::Text("sunny".to_string()));
        let attrs = entity.attributes();
        assert_eq!(attrs["temperature"], 25.0);
        assert_eq!(attrs["wind_speed"], 14.0);
        assert_eq!(attrs["wind_bearing"], 180.0);
        assert_eq!(attrs["visibility"], 10.0);
        assert_eq!(attrs["condition_cn"], "晴");
        assert_eq!(attrs["wind_direction_cn"], "南风");
        assert_eq!(attrs["aqi"], 75.0);
        assert_eq!(attrs["update_time"], "2026-02-12T14:00:00+08:00");
        assert_eq!(attrs["forecast_daily"][1]["condition_night"], "小雨");
        assert_eq!(attrs["alerts"][0]["type"], "大风");
        assert!(attrs.get("stale").is_none());
    }

    #[test]
    fn test_unknown_condition_is_exceptional() {
        let mut body = fixtures::response();
        body["result"]["now"]["text"] = serde_json::json!("彩虹");
        let mut results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        results.insert(
            EndpointKind::Current,
            Ok(fixtures::payload_from(EndpointKind::Current, body)),
        );

        let entity = WeatherEntity::new("Home");
        entity.on_snapshot(&Arc::new(build(None, &results)));
        assert_eq!(entity.state(), EntityState::Text("exceptional".to_string()));
        assert_eq!(entity.attributes()["condition_cn"], "彩虹");
    }

    #[test]
    fn test_forecasts() {
        let entity = WeatherEntity::new("Home");
        entity.on_snapshot(&snapshot());

        let daily = entity.forecast_daily().unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].datetime, "2026-02-12T00:00:00+08:00");
        assert_eq!(daily[0].condition.as_deref(), Some("sunny"));
        assert_eq!(daily[0].temperature, Some(28.0));
        assert_eq!(daily[0].templow, Some(18.0));

        let hourly = entity.forecast_hourly().unwrap();
        assert_eq!(hourly[0].datetime, "2026-02-12T15:00:00+08:00");
        assert_eq!(hourly[1].condition.as_deref(), Some("partlycloudy"));
        assert_eq!(hourly[1].precipitation_probability, Some(10.0));
    }

    #[test]
    fn test_stale_flag_when_current_not_refreshed() {
        let previous = snapshot();
        let mut results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        results.insert(
            EndpointKind::Current,
            Err(FetchError::Transport {
                message: "timeout".to_string(),
            }),
        );

        let entity = WeatherEntity::new("Home");
        entity.on_snapshot(&Arc::new(build(Some(&previous), &results)));
        let attrs = entity.attributes();
        assert_eq!(attrs["stale"], true);
        assert_eq!(attrs["temperature"], 25.0);
    }
}
