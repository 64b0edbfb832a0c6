use std::fmt;

use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Value;

use crate::weather::EndpointKind;
use crate::weather::WeatherSnapshot;

pub const ATTRIBUTION: &str = "数据来源：百度地图天气服务";

/// Attribute map of an entity, in host naming.
pub type Attributes = Map<String, Value>;

/// Entity state value as the host sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    /// No snapshot was ever built.
    Unavailable,
    /// A snapshot exists but lacks the data this entity shows.
    Unknown,
    Text(String),
    Number(f64),
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Unavailable => f.write_str("unavailable"),
            EntityState::Unknown => f.write_str("unknown"),
            EntityState::Text(text) => f.write_str(text),
            EntityState::Number(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for EntityState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EntityState::Number(n) => serializer.serialize_f64(*n),
            other => serializer.collect_str(other),
        }
    }
}

/// Read-only projection of the current snapshot.
///
/// Implementations hold a reference to the last published snapshot and derive state
/// and attributes from it on demand.
pub trait Entity: Send + Sync {
    fn entity_id(&self) -> &str;

    /// Platform type of this entity (e.g. "weather", "sensor").
    fn platform(&self) -> &'static str;

    fn state(&self) -> EntityState;

    fn attributes(&self) -> Attributes;

    /// Serialized view used by the HTTP API.
    fn state_json(&self) -> Value {
        serde_json::json!({
            "entity_id": self.entity_id(),
            "platform": self.platform(),
            "state": self.state(),
            "attributes": self.attributes(),
        })
    }
}

/// Attributes every entity carries: attribution, plus `stale` when the section
/// it reads failed to refresh in the last cycle.
pub(crate) fn base_attributes(snapshot: Option<&WeatherSnapshot>, kinds: &[EndpointKind]) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("attribution".into(), ATTRIBUTION.into());
    if let Some(snapshot) = snapshot {
        if kinds.iter().any(|kind| snapshot.is_stale(*kind)) {
            attrs.insert("stale".into(), true.into());
        }
    }
    attrs
}

/// Insert `value` under `key` unless it is `None`.
pub(crate) fn insert_some<T: Into<Value>>(attrs: &mut Attributes, key: &str, value: Option<T>) {
    if let Some(v) = value {
        attrs.insert(key.to_string(), v.into());
    }
}

/// Lowercase ASCII identifier for entity ids; anything else becomes `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "wxbridge".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_value(EntityState::Unavailable).unwrap(),
            "unavailable"
        );
        assert_eq!(serde_json::to_value(EntityState::Unknown).unwrap(), "unknown");
        assert_eq!(
            serde_json::to_value(EntityState::Text("无预警".into())).unwrap(),
            "无预警"
        );
        assert_eq!(
            serde_json::to_value(EntityState::Number(75.0)).unwrap(),
            serde_json::json!(75.0)
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Home"), "home");
        assert_eq!(slugify("Beijing Haidian"), "beijing_haidian");
        assert_eq!(slugify("  my--place "), "my_place");
        assert_eq!(slugify("海淀"), "wxbridge");
    }

    #[test]
    fn test_insert_some_skips_none() {
        let mut attrs = Attributes::new();
        insert_some(&mut attrs, "a", Some(1.5));
        insert_some::<f64>(&mut attrs, "b", None);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["a"], 1.5);
    }
}
