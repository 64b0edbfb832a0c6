use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::entity::base_attributes;
use super::entity::insert_some;
use super::entity::slugify;
use super::entity::Attributes;
use super::entity::Entity;
use super::entity::EntityState;
use crate::coordinator::Subscriber;
use crate::weather::snapshot::DailyForecast;
use crate::weather::EndpointKind;
use crate::weather::WeatherSnapshot;

/// Number of daily forecast sensors (today plus four days).
pub const FORECAST_SENSOR_DAYS: usize = 5;

const DAY_KEYS: [&str; FORECAST_SENSOR_DAYS] = [
    "forecast_today",
    "forecast_tomorrow",
    "forecast_day2",
    "forecast_day3",
    "forecast_day4",
];

const DAY_LABELS: [&str; FORECAST_SENSOR_DAYS] = ["今天", "明天", "后天", "大后天", "第五天"];

/// One day of the daily forecast, summarized for reading aloud (e.g. `晴转多云 18~28°C`).
pub struct DailyForecastSensor {
    entity_id: String,
    day_index: usize,
    snapshot: ArcSwapOption<WeatherSnapshot>,
}

impl DailyForecastSensor {
    /// Sensor for `day_index` days from today. Indices past the last sensor clamp to it.
    pub fn new(name: &str, day_index: usize) -> Self {
        let day_index = day_index.min(FORECAST_SENSOR_DAYS - 1);
        Self {
            entity_id: format!("sensor.{}_{}", slugify(name), DAY_KEYS[day_index]),
            day_index,
            snapshot: ArcSwapOption::empty(),
        }
    }

    pub fn day_label(&self) -> &'static str {
        DAY_LABELS[self.day_index]
    }
}

/// Human-readable condition and temperature range for one day.
pub fn summarize(day: &DailyForecast) -> String {
    let text_day = day.day.condition_text.as_deref().filter(|t| !t.is_empty());
    let text_night = day.night.condition_text.as_deref().filter(|t| !t.is_empty());
    let condition = match (text_day, text_night) {
        (Some(d), Some(n)) if d != n => format!("{}转{}", d, n),
        (Some(d), _) => d.to_string(),
        (None, Some(n)) => n.to_string(),
        (None, None) => "未知".to_string(),
    };

    let temperature = match (day.temperature_low, day.temperature_high) {
        (Some(low), Some(high)) => Some(format!("{}~{}°C", low, high)),
        (None, Some(high)) => Some(format!("最高{}°C", high)),
        (Some(low), None) => Some(format!("最低{}°C", low)),
        (None, None) => None,
    };

    match temperature {
        Some(t) => format!("{} {}", condition, t),
        None => condition,
    }
}

impl Entity for DailyForecastSensor {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn state(&self) -> EntityState {
        let Some(snapshot) = self.snapshot.load_full() else {
            return EntityState::Unavailable;
        };
        match snapshot.daily().and_then(|d| d.get(self.day_index)) {
            Some(day) => EntityState::Text(summarize(day)),
            None => EntityState::Unknown,
        }
    }

    fn attributes(&self) -> Attributes {
        let snapshot = self.snapshot.load_full();
        let mut attrs = base_attributes(snapshot.as_deref(), &[EndpointKind::Daily]);
        let Some(day) = snapshot
            .as_deref()
            .and_then(WeatherSnapshot::daily)
            .and_then(|d| d.get(self.day_index))
        else {
            return attrs;
        };

        insert_some(&mut attrs, "date", day.date.map(|d| d.to_string()));
        attrs.insert("day_label".into(), self.day_label().into());
        insert_some(&mut attrs, "condition_day", day.day.condition_text.clone());
        insert_some(&mut attrs, "condition_night", day.night.condition_text.clone());
        insert_some(&mut attrs, "temperature_high", day.temperature_high);
        insert_some(&mut attrs, "temperature_low", day.temperature_low);
        insert_some(&mut attrs, "wind_class_day", day.day.wind.class_text());
        insert_some(&mut attrs, "wind_direction_day", day.day.wind.direction_text());
        insert_some(&mut attrs, "wind_class_night", day.night.wind.class_text());
        insert_some(&mut attrs, "wind_direction_night", day.night.wind.direction_text());
        attrs
    }
}

impl Subscriber for DailyForecastSensor {
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
    use crate::weather::snapshot::HalfDay;

    fn snapshot() -> Arc<WeatherSnapshot> {
        let results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        Arc::new(build(None, &results))
    }

    fn day(text_day: Option<&str>, text_night: Option<&str>, low: Option<f64>, high: Option<f64>) -> DailyForecast {
        DailyForecast {
            temperature_low: low,
            temperature_high: high,
            day: HalfDay {
                condition_text: text_day.map(String::from),
                ..Default::default()
            },
            night: HalfDay {
                condition_text: text_night.map(String::from),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_summaries() {
        assert_eq!(
            summarize(&day(Some("晴"), Some("多云"), Some(18.0), Some(28.0))),
            "晴转多云 18~28°C"
        );
        assert_eq!(summarize(&day(Some("晴"), Some("晴"), None, Some(28.0))), "晴 最高28°C");
        assert_eq!(summarize(&day(None, Some("小雨"), Some(-2.5), None)), "小雨 最低-2.5°C");
        assert_eq!(summarize(&day(None, None, None, None)), "未知");
    }

    #[test]
    fn test_sensor_per_day() {
        let snapshot = snapshot();
        let today = DailyForecastSensor::new("Home", 0);
        let tomorrow = DailyForecastSensor::new("Home", 1);
        let day4 = DailyForecastSensor::new("Home", 4);
        for sensor in [&today, &tomorrow, &day4] {
            assert_eq!(sensor.state(), EntityState::Unavailable);
            sensor.on_snapshot(&snapshot);
        }

        assert_eq!(today.entity_id(), "sensor.home_forecast_today");
        assert_eq!(today.state(), EntityState::Text("晴转多云 18~28°C".to_string()));
        assert_eq!(tomorrow.state(), EntityState::Text("多云转小雨 16~26°C".to_string()));

        let attrs = tomorrow.attributes();
        assert_eq!(attrs["day_label"], "明天");
        assert_eq!(attrs["date"], "2026-02-13");
        assert_eq!(attrs["wind_class_day"], "4级");
        assert_eq!(attrs["wind_direction_night"], "东风");

        // The fixture only has two days.
        assert_eq!(day4.entity_id(), "sensor.home_forecast_day4");
        assert_eq!(day4.state(), EntityState::Unknown);
        assert!(day4.attributes().get("day_label").is_none());
    }
}
