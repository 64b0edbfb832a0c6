//! Entity adapters: read-only projections of the coordinator's snapshot.

mod alert;
mod aqi;
mod entity;
mod forecast;
mod weather;

use std::sync::Arc;

pub use alert::AlertSensor;
pub use aqi::AqiSensor;
pub use entity::slugify;
pub use entity::Attributes;
pub use entity::Entity;
pub use entity::EntityState;
pub use entity::ATTRIBUTION;
pub use forecast::summarize;
pub use forecast::DailyForecastSensor;
pub use forecast::FORECAST_SENSOR_DAYS;
pub use weather::Forecast;
pub use weather::WeatherEntity;

use crate::coordinator::Coordinator;
use crate::coordinator::SubscriberId;

/// Every entity of one configured location, registered with its coordinator.
pub struct EntitySet {
    pub weather: Arc<WeatherEntity>,
    pub alert: Arc<AlertSensor>,
    pub aqi: Arc<AqiSensor>,
    pub forecasts: Vec<Arc<DailyForecastSensor>>,
    subscriptions: Vec<SubscriberId>,
}

impl EntitySet {
    /// Create the entities for `name` and register them with `coordinator`.
    ///
    /// Registration order (and so notification order) is weather, alert, AQI, then
    /// the forecast sensors from today onwards.
    pub fn register(coordinator: &Coordinator, name: &str) -> Self {
        let weather = Arc::new(WeatherEntity::new(name));
        let alert = Arc::new(AlertSensor::new(name));
        let aqi = Arc::new(AqiSensor::new(name));
        let forecasts: Vec<_> = (0..FORECAST_SENSOR_DAYS)
            .map(|day| Arc::new(DailyForecastSensor::new(name, day)))
            .collect();

        let mut subscriptions = vec![
            coordinator.register(weather.clone()),
            coordinator.register(alert.clone()),
            coordinator.register(aqi.clone()),
        ];
        for sensor in &forecasts {
            subscriptions.push(coordinator.register(sensor.clone()));
        }

        Self {
            weather,
            alert,
            aqi,
            forecasts,
            subscriptions,
        }
    }

    /// All entities in registration order.
    pub fn all(&self) -> Vec<Arc<dyn Entity>> {
        let mut entities: Vec<Arc<dyn Entity>> =
            vec![self.weather.clone(), self.alert.clone(), self.aqi.clone()];
        entities.extend(self.forecasts.iter().map(|s| s.clone() as Arc<dyn Entity>));
        entities
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<dyn Entity>> {
        self.all().into_iter().find(|e| e.entity_id() == entity_id)
    }

    /// Remove every entity from the coordinator.
    pub fn unregister(&self, coordinator: &Coordinator) {
        for id in &self.subscriptions {
            coordinator.unregister(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::secret::ApiKey;
    use crate::weather::gateway::MockGateway;
    use crate::weather::LocationDescriptor;

    fn coordinator() -> Coordinator {
        Coordinator::new(
            Arc::new(MockGateway::new()),
            LocationDescriptor::Coordinates {
                latitude: 39.9,
                longitude: 116.4,
            },
            ApiKey::new("test-key"),
            Duration::from_secs(900),
        )
    }

    #[tokio::test]
    async fn test_entities_follow_refresh() {
        let coordinator = coordinator();
        let entities = EntitySet::register(&coordinator, "Home");
        assert_eq!(entities.all().len(), 8);
        assert!(entities
            .all()
            .iter()
            .all(|e| e.state() == EntityState::Unavailable));

        coordinator.request_refresh().await;

        assert_eq!(
            entities.weather.state(),
            EntityState::Text("sunny".to_string())
        );
        assert_eq!(entities.aqi.state(), EntityState::Number(75.0));
        assert_eq!(
            entities.alert.state(),
            EntityState::Text("1条预警".to_string())
        );
        assert!(entities.get("sensor.home_forecast_tomorrow").is_some());
        assert!(entities.get("sensor.nope").is_none());
    }

    #[tokio::test]
    async fn test_unregister_detaches_entities() {
        let coordinator = coordinator();
        let entities = EntitySet::register(&coordinator, "Home");
        entities.unregister(&coordinator);
        assert_eq!(coordinator.status().subscribers, 0);

        coordinator.request_refresh().await;
        assert_eq!(entities.weather.state(), EntityState::Unavailable);
    }

    #[test]
    fn test_state_json_shape() {
        let coordinator = coordinator();
        let entities = EntitySet::register(&coordinator, "Home");
        let json = entities.aqi.state_json();
        assert_eq!(json["entity_id"], "sensor.home_aqi");
        assert_eq!(json["platform"], "sensor");
        assert_eq!(json["state"], "unavailable");
        assert_eq!(json["attributes"]["attribution"], ATTRIBUTION);
    }
}
