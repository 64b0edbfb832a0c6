use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::entity::base_attributes;
use super::entity::insert_some;
use super::entity::slugify;
use super::entity::Attributes;
use super::entity::Entity;
use super::entity::EntityState;
use crate::coordinator::Subscriber;
use crate::weather::translate::Mapped;
use crate::weather::EndpointKind;
use crate::weather::WeatherSnapshot;

/// Air quality index sensor with pollutant readings as attributes.
pub struct AqiSensor {
    entity_id: String,
    snapshot: ArcSwapOption<WeatherSnapshot>,
}

impl AqiSensor {
    pub fn new(name: &str) -> Self {
        Self {
            entity_id: format!("sensor.{}_aqi", slugify(name)),
            snapshot: ArcSwapOption::empty(),
        }
    }
}

impl Entity for AqiSensor {
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
        match snapshot.air_quality() {
            Some(aq) => EntityState::Number(aq.aqi),
            None => EntityState::Unknown,
        }
    }

    fn attributes(&self) -> Attributes {
        let snapshot = self.snapshot.load_full();
        let mut attrs = base_attributes(snapshot.as_deref(), &[EndpointKind::AirQuality]);
        attrs.insert("state_class".into(), "measurement".into());
        let Some(aq) = snapshot.as_deref().and_then(WeatherSnapshot::air_quality) else {
            return attrs;
        };

        insert_some(&mut attrs, "pm25", aq.pm25);
        insert_some(&mut attrs, "pm10", aq.pm10);
        insert_some(&mut attrs, "no2", aq.no2);
        insert_some(&mut attrs, "so2", aq.so2);
        insert_some(&mut attrs, "o3", aq.o3);
        insert_some(&mut attrs, "co", aq.co);
        if let Mapped::Known(category) = &aq.category {
            attrs.insert("aqi_level".into(), category.label().into());
        }
        attrs
    }
}

impl Subscriber for AqiSensor {
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

    #[test]
    fn test_aqi_state_and_level() {
        let results: BTreeMap<_, _> = EndpointKind::iter()
            .map(|kind| (kind, Ok(fixtures::payload(kind))))
            .collect();
        let sensor = AqiSensor::new("Home");
        assert_eq!(sensor.state(), EntityState::Unavailable);

        sensor.on_snapshot(&Arc::new(build(None, &results)));
        assert_eq!(sensor.entity_id(), "sensor.home_aqi");
        assert_eq!(sensor.state(), EntityState::Number(75.0));
        let attrs = sensor.attributes();
        assert_eq!(attrs["aqi_level"], "良");
        assert_eq!(attrs["pm25"], 35.0);
        assert_eq!(attrs["co"], 0.5);
        assert_eq!(attrs["state_class"], "measurement");
    }
}
