use std::fmt;

use serde::Serialize;

/// Administrative division as addressed by the upstream service.
///
/// The names are informational; requests are keyed by `district_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminCode {
    pub province: String,
    pub city: String,
    pub district: String,
    pub district_id: String,
}

/// Where to fetch weather for. Exactly one of the two forms, fixed once a coordinator exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LocationDescriptor {
    District(AdminCode),
    Coordinates { latitude: f64, longitude: f64 },
}

impl LocationDescriptor {
    /// Query parameters identifying this location.
    ///
    /// Coordinates are sent as `longitude,latitude` (longitude first) in WGS84.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            LocationDescriptor::District(code) => {
                vec![("district_id", code.district_id.clone())]
            }
            LocationDescriptor::Coordinates {
                latitude,
                longitude,
            } => vec![
                ("location", format!("{},{}", longitude, latitude)),
                ("coordtype", "wgs84".to_string()),
            ],
        }
    }
}

impl fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationDescriptor::District(code) => write!(
                f,
                "{}/{}/{} ({})",
                code.province, code.city, code.district, code.district_id
            ),
            LocationDescriptor::Coordinates {
                latitude,
                longitude,
            } => write!(f, "{:.4},{:.4}", latitude, longitude),
        }
    }
}
