use thiserror::Error;

use super::districts::DistrictTable;
use crate::weather::LocationDescriptor;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("unknown province '{0}'")]
    UnknownProvince(String),

    #[error("unknown city '{city}' in {province}")]
    UnknownCity { province: String, city: String },

    #[error("unknown district '{district}' in {province} {city}")]
    UnknownDistrict {
        province: String,
        city: String,
        district: String,
    },

    #[error("invalid coordinates {latitude},{longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("cannot {action} while {step}")]
    WrongStep {
        action: &'static str,
        step: &'static str,
    },
}

/// How the location is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupMode {
    /// Province, then city, then district from the district table
    District,
    /// A latitude/longitude pair
    Coordinates,
}

/// Location setup, one step at a time.
///
/// Each transition consumes the current step. The only output is the
/// [`LocationDescriptor`] of a completed setup.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationSetup {
    SelectingProvince,
    SelectingCity { province: String },
    SelectingDistrict { province: String, city: String },
    SelectingCoordinate,
    Complete(LocationDescriptor),
}

impl LocationSetup {
    pub fn start(mode: SetupMode) -> Self {
        match mode {
            SetupMode::District => LocationSetup::SelectingProvince,
            SetupMode::Coordinates => LocationSetup::SelectingCoordinate,
        }
    }

    fn step(&self) -> &'static str {
        match self {
            LocationSetup::SelectingProvince => "selecting a province",
            LocationSetup::SelectingCity { .. } => "selecting a city",
            LocationSetup::SelectingDistrict { .. } => "selecting a district",
            LocationSetup::SelectingCoordinate => "entering coordinates",
            LocationSetup::Complete(_) => "complete",
        }
    }

    /// Choices offered at this step; empty when the step takes no choice.
    pub fn options<'a>(&self, table: &'a DistrictTable) -> Vec<&'a str> {
        match self {
            LocationSetup::SelectingProvince => table.provinces(),
            LocationSetup::SelectingCity { province } => {
                table.cities(province).unwrap_or_default()
            }
            LocationSetup::SelectingDistrict { province, city } => {
                table.districts(province, city).unwrap_or_default()
            }
            LocationSetup::SelectingCoordinate | LocationSetup::Complete(_) => Vec::new(),
        }
    }

    /// Pick one of [`LocationSetup::options`].
    pub fn select(self, table: &DistrictTable, choice: &str) -> Result<Self, SetupError> {
        match self {
            LocationSetup::SelectingProvince => {
                if table.cities(choice).is_none() {
                    return Err(SetupError::UnknownProvince(choice.to_string()));
                }
                Ok(LocationSetup::SelectingCity {
                    province: choice.to_string(),
                })
            }
            LocationSetup::SelectingCity { province } => {
                if table.districts(&province, choice).is_none() {
                    return Err(SetupError::UnknownCity {
                        province,
                        city: choice.to_string(),
                    });
                }
                Ok(LocationSetup::SelectingDistrict {
                    province,
                    city: choice.to_string(),
                })
            }
            LocationSetup::SelectingDistrict { province, city } => {
                match table.lookup(&province, &city, choice) {
                    Some(code) => Ok(LocationSetup::Complete(LocationDescriptor::District(code))),
                    None => Err(SetupError::UnknownDistrict {
                        province,
                        city,
                        district: choice.to_string(),
                    }),
                }
            }
            other => Err(SetupError::WrongStep {
                action: "select a region",
                step: other.step(),
            }),
        }
    }

    /// Enter a coordinate pair. `0,0` is treated as unset.
    pub fn enter_coordinates(self, latitude: f64, longitude: f64) -> Result<Self, SetupError> {
        if self != LocationSetup::SelectingCoordinate {
            return Err(SetupError::WrongStep {
                action: "enter coordinates",
                step: self.step(),
            });
        }

        let in_range =
            (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if !in_range || (latitude == 0.0 && longitude == 0.0) {
            return Err(SetupError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        Ok(LocationSetup::Complete(LocationDescriptor::Coordinates {
            latitude,
            longitude,
        }))
    }

    /// The chosen location, once setup is complete.
    pub fn finish(self) -> Result<LocationDescriptor, SetupError> {
        match self {
            LocationSetup::Complete(location) => Ok(location),
            other => Err(SetupError::WrongStep {
                action: "finish",
                step: other.step(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::districts::SAMPLE;
    use crate::weather::AdminCode;

    #[test]
    fn test_district_walkthrough() {
        let table = DistrictTable::parse(SAMPLE);
        let setup = LocationSetup::start(SetupMode::District);
        assert_eq!(setup.options(&table), vec!["上海市", "北京市", "广东省"]);

        let setup = setup.select(&table, "广东省").unwrap();
        assert_eq!(setup.options(&table), vec!["广州市", "深圳市"]);
        let setup = setup.select(&table, "深圳市").unwrap();
        assert_eq!(setup.options(&table), vec!["南山区", "福田区"]);
        let setup = setup.select(&table, "南山区").unwrap();
        assert!(setup.options(&table).is_empty());

        assert_eq!(
            setup.finish().unwrap(),
            LocationDescriptor::District(AdminCode {
                province: "广东省".to_string(),
                city: "深圳市".to_string(),
                district: "南山区".to_string(),
                district_id: "440305".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_choices() {
        let table = DistrictTable::parse(SAMPLE);
        let start = LocationSetup::start(SetupMode::District);
        assert_eq!(
            start.clone().select(&table, "河北省"),
            Err(SetupError::UnknownProvince("河北省".to_string()))
        );

        let city = start.select(&table, "北京市").unwrap();
        assert!(matches!(
            city.clone().select(&table, "天津市"),
            Err(SetupError::UnknownCity { .. })
        ));

        let district = city.select(&table, "北京市").unwrap();
        let err = district.select(&table, "朝阳区").unwrap_err();
        assert_eq!(err.to_string(), "unknown district '朝阳区' in 北京市 北京市");
    }

    #[test]
    fn test_coordinates() {
        let setup = LocationSetup::start(SetupMode::Coordinates);
        assert!(matches!(
            setup.clone().enter_coordinates(0.0, 0.0),
            Err(SetupError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            setup.clone().enter_coordinates(95.0, 116.4),
            Err(SetupError::InvalidCoordinates { .. })
        ));

        let location = setup.enter_coordinates(39.9, 116.4).unwrap().finish().unwrap();
        assert_eq!(
            location,
            LocationDescriptor::Coordinates {
                latitude: 39.9,
                longitude: 116.4,
            }
        );
    }

    #[test]
    fn test_wrong_step() {
        let table = DistrictTable::parse(SAMPLE);
        let err = LocationSetup::start(SetupMode::Coordinates)
            .select(&table, "北京市")
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot select a region while entering coordinates");

        let err = LocationSetup::start(SetupMode::District)
            .enter_coordinates(39.9, 116.4)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot enter coordinates while selecting a province");

        let err = LocationSetup::start(SetupMode::District).finish().unwrap_err();
        assert_eq!(err.to_string(), "cannot finish while selecting a province");
    }
}
