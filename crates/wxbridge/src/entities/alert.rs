use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::Value;

use super::entity::base_attributes;
use super::entity::slugify;
use super::entity::Attributes;
use super::entity::Entity;
use super::entity::EntityState;
use crate::coordinator::Subscriber;
use crate::weather::snapshot::Alert;
use crate::weather::EndpointKind;
use crate::weather::WeatherSnapshot;

const NO_ALERTS: &str = "无预警";
const UNSPECIFIED: &str = "未知";

/// Sensor summarizing active weather alerts; the first alert is the primary one.
pub struct AlertSensor {
    entity_id: String,
    snapshot: ArcSwapOption<WeatherSnapshot>,
}

impl AlertSensor {
    pub fn new(name: &str) -> Self {
        Self {
            entity_id: format!("sensor.{}_alert", slugify(name)),
            snapshot: ArcSwapOption::empty(),
        }
    }
}

fn alert_entry(alert: &Alert) -> Value {
    serde_json::json!({
        "type": alert.kind.as_deref().unwrap_or(UNSPECIFIED),
        "level": alert.level.as_deref().unwrap_or(UNSPECIFIED),
        "title": alert.title.as_deref().unwrap_or_default(),
        "description": alert.description.as_deref().unwrap_or_default(),
    })
}

impl Entity for AlertSensor {
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
        match snapshot.alerts() {
            None => EntityState::Unknown,
            Some([]) => EntityState::Text(NO_ALERTS.to_string()),
            Some(alerts) => EntityState::Text(format!("{}条预警", alerts.len())),
        }
    }

    fn attributes(&self) -> Attributes {
        let snapshot = self.snapshot.load_full();
        let mut attrs = base_attributes(snapshot.as_deref(), &[EndpointKind::Alerts]);
        let Some(alerts) = snapshot.as_deref().and_then(WeatherSnapshot::alerts) else {
            return attrs;
        };

        attrs.insert("alert_count".into(), alerts.len().into());
        attrs.insert(
            "alerts".into(),
            Value::Array(alerts.iter().map(alert_entry).collect()),
        );
        if let Some(Value::Object(primary)) = alerts.first().map(alert_entry) {
            for (key, value) in primary {
                attrs.insert(format!("alert_{}", key), value);
            }
        }
        attrs
    }
}

impl Subscriber for AlertSensor {
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

    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::weather::build;
    use crate::weather::fixtures;
    use crate::weather::FetchError;

    fn snapshot_with_alerts(alerts: Value) -> WeatherSnapshot {
        let mut body = fixtures::response();
        body["result"]["alerts"] = alerts;
        let mut results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        results.insert(
            EndpointKind::Alerts,
            Ok(fixtures::payload_from(EndpointKind::Alerts, body)),
        );
        build(None, &results)
    }

    #[test]
    fn test_no_alerts() {
        let sensor = AlertSensor::new("Home");
        assert_eq!(sensor.state(), EntityState::Unavailable);

        sensor.on_snapshot(&Arc::new(snapshot_with_alerts(json!([]))));
        assert_eq!(sensor.entity_id(), "sensor.home_alert");
        assert_eq!(sensor.state(), EntityState::Text("无预警".to_string()));
        let attrs = sensor.attributes();
        assert_eq!(attrs["alert_count"], 0);
        assert!(attrs.get("alert_type").is_none());
    }

    #[test]
    fn test_primary_alert_attributes() {
        let sensor = AlertSensor::new("Home");
        sensor.on_snapshot(&Arc::new(snapshot_with_alerts(json!([
            {"type": "大风", "level": "蓝色", "title": "大风蓝色预警", "desc": "阵风7级"},
            {"type": "寒潮", "title": "寒潮预警"}
        ]))));

        assert_eq!(sensor.state(), EntityState::Text("2条预警".to_string()));
        let attrs = sensor.attributes();
        assert_eq!(attrs["alert_count"], 2);
        assert_eq!(attrs["alert_type"], "大风");
        assert_eq!(attrs["alert_level"], "蓝色");
        assert_eq!(attrs["alert_title"], "大风蓝色预警");
        assert_eq!(attrs["alert_description"], "阵风7级");
        assert_eq!(attrs["alerts"][1]["level"], "未知");
        assert_eq!(attrs["alerts"][1]["description"], "");
    }

    #[test]
    fn test_unknown_when_alerts_never_fetched() {
        let mut results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        results.insert(
            EndpointKind::Alerts,
            Err(FetchError::Transport {
                message: "reset".to_string(),
            }),
        );
        let sensor = AlertSensor::new("Home");
        sensor.on_snapshot(&Arc::new(build(None, &results)));
        assert_eq!(sensor.state(), EntityState::Unknown);
        assert_eq!(sensor.attributes()["stale"], true);
    }
}
