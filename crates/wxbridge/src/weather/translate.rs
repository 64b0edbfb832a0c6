//! Pure mappings from the upstream vocabulary and units into the entity schema.
//!
//! Nothing in here fails: input outside the known domain comes back as
//! [`Mapped::Unknown`] carrying the raw value, so one odd field never sinks a refresh.

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use serde::Serialize;
use strum::EnumIter;
use strum::IntoEnumIterator;

/// Result of a vocabulary lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Mapped<T> {
    Known(T),
    /// Value outside the known domain, kept verbatim for diagnostics.
    Unknown { raw: String },
}

impl<T> Mapped<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Mapped::Known(v) => Some(v),
            Mapped::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Mapped::Unknown { .. })
    }

    fn unknown(raw: impl Into<String>) -> Self {
        Mapped::Unknown { raw: raw.into() }
    }
}

/// Weather condition vocabulary of the host platform.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Condition {
    Sunny,
    #[serde(rename = "partlycloudy")]
    #[strum(serialize = "partlycloudy")]
    PartlyCloudy,
    Cloudy,
    Rainy,
    LightningRainy,
    Hail,
    SnowyRainy,
    Pouring,
    Snowy,
    Fog,
    Exceptional,
}

/// Every condition text the upstream service documents.
pub const CONDITION_TABLE: &[(&str, Condition)] = &[
    ("晴", Condition::Sunny),
    ("多云", Condition::PartlyCloudy),
    ("阴", Condition::Cloudy),
    ("阵雨", Condition::Rainy),
    ("雷阵雨", Condition::LightningRainy),
    ("雷阵雨伴有冰雹", Condition::Hail),
    ("雨夹雪", Condition::SnowyRainy),
    ("小雨", Condition::Rainy),
    ("中雨", Condition::Rainy),
    ("大雨", Condition::Pouring),
    ("暴雨", Condition::Pouring),
    ("大暴雨", Condition::Pouring),
    ("特大暴雨", Condition::Pouring),
    ("阵雪", Condition::Snowy),
    ("小雪", Condition::Snowy),
    ("中雪", Condition::Snowy),
    ("大雪", Condition::Snowy),
    ("暴雪", Condition::Snowy),
    ("雾", Condition::Fog),
    ("冻雨", Condition::SnowyRainy),
    ("沙尘暴", Condition::Exceptional),
    ("小到中雨", Condition::Rainy),
    ("中到大雨", Condition::Rainy),
    ("大到暴雨", Condition::Pouring),
    ("暴雨到大暴雨", Condition::Pouring),
    ("大暴雨到特大暴雨", Condition::Pouring),
    ("小到中雪", Condition::Snowy),
    ("中到大雪", Condition::Snowy),
    ("大到暴雪", Condition::Snowy),
    ("浮尘", Condition::Exceptional),
    ("扬沙", Condition::Exceptional),
    ("强沙尘暴", Condition::Exceptional),
    ("霾", Condition::Fog),
    ("小雨-中雨", Condition::Rainy),
    ("中雨-大雨", Condition::Rainy),
    ("大雨-暴雨", Condition::Pouring),
    ("暴雨-大暴雨", Condition::Pouring),
    ("大暴雨-特大暴雨", Condition::Pouring),
    ("小雪-中雪", Condition::Snowy),
    ("中雪-大雪", Condition::Snowy),
    ("大雪-暴雪", Condition::Snowy),
];

/// Map an upstream condition text. The second element is the localized text as shown upstream.
pub fn translate_condition(text: &str) -> (Mapped<Condition>, String) {
    let text = text.trim();
    let mapped = CONDITION_TABLE
        .iter()
        .find(|(key, _)| *key == text)
        .map(|(_, condition)| Mapped::Known(*condition))
        .unwrap_or_else(|| Mapped::unknown(text));
    (mapped, text.to_string())
}

/// Eight-point compass direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum Compass {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Compass {
    pub fn bearing(self) -> f64 {
        match self {
            Compass::North => 0.0,
            Compass::NorthEast => 45.0,
            Compass::East => 90.0,
            Compass::SouthEast => 135.0,
            Compass::South => 180.0,
            Compass::SouthWest => 225.0,
            Compass::West => 270.0,
            Compass::NorthWest => 315.0,
        }
    }

    /// Upstream wind direction text, e.g. `东北风`.
    pub fn label(self) -> &'static str {
        match self {
            Compass::North => "北风",
            Compass::NorthEast => "东北风",
            Compass::East => "东风",
            Compass::SouthEast => "东南风",
            Compass::South => "南风",
            Compass::SouthWest => "西南风",
            Compass::West => "西风",
            Compass::NorthWest => "西北风",
        }
    }

    /// Nearest compass point for a bearing in degrees.
    pub fn from_bearing(degrees: f64) -> Self {
        let sector = ((degrees.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
        Compass::iter().nth(sector).unwrap_or(Compass::North)
    }

    fn from_label(text: &str) -> Option<Self> {
        Compass::iter().find(|c| c.label() == text)
    }
}

/// Wind force class as reported upstream (descriptive names or Beaufort-like levels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindForce {
    /// 微风
    Breeze,
    /// 和风
    Moderate,
    /// 清风
    Fresh,
    /// <3级
    BelowLevel3,
    /// 1级 .. 12级
    Level(u8),
    /// e.g. 3-4级
    LevelRange(u8, u8),
}

/// Approximate midpoint speed in km/h for levels 1..=12.
const LEVEL_SPEED_KMH: [f64; 12] = [
    2.0, 7.0, 14.0, 22.0, 32.0, 42.0, 54.0, 67.0, 81.0, 96.0, 112.0, 130.0,
];

impl WindForce {
    pub fn speed_kmh(self) -> f64 {
        match self {
            WindForce::Breeze => 5.0,
            WindForce::Moderate => 15.0,
            WindForce::Fresh => 25.0,
            WindForce::BelowLevel3 => 9.0,
            WindForce::Level(n) => level_speed(n),
            WindForce::LevelRange(lo, hi) => (level_speed(lo) + level_speed(hi)) / 2.0,
        }
    }

    pub fn label(self) -> String {
        match self {
            WindForce::Breeze => "微风".to_string(),
            WindForce::Moderate => "和风".to_string(),
            WindForce::Fresh => "清风".to_string(),
            WindForce::BelowLevel3 => "<3级".to_string(),
            WindForce::Level(n) => format!("{}级", n),
            WindForce::LevelRange(lo, hi) => format!("{}-{}级", lo, hi),
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "微风" => return Some(WindForce::Breeze),
            "和风" => return Some(WindForce::Moderate),
            "清风" => return Some(WindForce::Fresh),
            "<3级" => return Some(WindForce::BelowLevel3),
            _ => {}
        }

        let levels = text.strip_suffix('级')?;
        match levels.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_level(lo)?;
                let hi = parse_level(hi)?;
                (lo < hi).then_some(WindForce::LevelRange(lo, hi))
            }
            None => parse_level(levels).map(WindForce::Level),
        }
    }
}

fn parse_level(text: &str) -> Option<u8> {
    text.trim()
        .parse::<u8>()
        .ok()
        .filter(|n| (1..=12).contains(n))
}

fn level_speed(level: u8) -> f64 {
    LEVEL_SPEED_KMH[usize::from(level.clamp(1, 12)) - 1]
}

/// Wind in target units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Wind {
    /// Degrees clockwise from north.
    pub bearing: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub class: Option<Mapped<WindForce>>,
    pub direction: Option<Mapped<Compass>>,
}

impl Wind {
    /// Class text for display, either the canonical label or the raw upstream text.
    pub fn class_text(&self) -> Option<String> {
        self.class.as_ref().map(|c| match c {
            Mapped::Known(force) => force.label(),
            Mapped::Unknown { raw } => raw.clone(),
        })
    }

    pub fn direction_text(&self) -> Option<String> {
        self.direction.as_ref().map(|d| match d {
            Mapped::Known(compass) => compass.label().to_string(),
            Mapped::Unknown { raw } => raw.clone(),
        })
    }
}

/// Map upstream wind fields.
///
/// A numeric angle wins over the direction text for the bearing. Missing inputs stay
/// `None`; present but unrecognized inputs become `Unknown`.
pub fn translate_wind(angle: Option<f64>, class: Option<&str>, direction: Option<&str>) -> Wind {
    let angle = angle.filter(|a| a.is_finite()).map(|a| a.rem_euclid(360.0));

    let class = class.map(str::trim).filter(|c| !c.is_empty()).map(|text| {
        WindForce::parse(text)
            .map(Mapped::Known)
            .unwrap_or_else(|| Mapped::unknown(text))
    });

    let direction = match direction.map(str::trim).filter(|d| !d.is_empty()) {
        Some(text) => Some(
            Compass::from_label(text)
                .map(Mapped::Known)
                .unwrap_or_else(|| Mapped::unknown(text)),
        ),
        None => angle.map(|a| Mapped::Known(Compass::from_bearing(a))),
    };

    let bearing = angle.or_else(|| {
        direction
            .as_ref()
            .and_then(Mapped::known)
            .map(|c| c.bearing())
    });
    let speed_kmh = class
        .as_ref()
        .and_then(Mapped::known)
        .map(|f| f.speed_kmh());

    Wind {
        bearing,
        speed_kmh,
        class,
        direction,
    }
}

/// Chinese national AQI bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Excellent,
    Good,
    LightlyPolluted,
    ModeratelyPolluted,
    HeavilyPolluted,
    SeverelyPolluted,
}

impl AqiCategory {
    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Excellent => "优",
            AqiCategory::Good => "良",
            AqiCategory::LightlyPolluted => "轻度污染",
            AqiCategory::ModeratelyPolluted => "中度污染",
            AqiCategory::HeavilyPolluted => "重度污染",
            AqiCategory::SeverelyPolluted => "严重污染",
        }
    }
}

/// Map an AQI value onto its band. Negative or non-finite values are `Unknown`.
pub fn translate_aqi(value: f64) -> Mapped<AqiCategory> {
    if !value.is_finite() || value < 0.0 {
        return Mapped::unknown(value.to_string());
    }
    let category = if value <= 50.0 {
        AqiCategory::Excellent
    } else if value <= 100.0 {
        AqiCategory::Good
    } else if value <= 150.0 {
        AqiCategory::LightlyPolluted
    } else if value <= 200.0 {
        AqiCategory::ModeratelyPolluted
    } else if value <= 300.0 {
        AqiCategory::HeavilyPolluted
    } else {
        AqiCategory::SeverelyPolluted
    };
    Mapped::Known(category)
}

/// Upstream visibility is in metres.
pub fn visibility_km(metres: f64) -> f64 {
    metres / 1000.0
}

/// Upstream local times are China Standard Time.
const UPSTREAM_UTC_OFFSET_SECS: i32 = 8 * 3600;

fn upstream_local(naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(UPSTREAM_UTC_OFFSET_SECS)?;
    naive.and_local_timezone(offset).single()
}

/// Parse a forecast day such as `2026-02-12` as local midnight.
pub fn parse_day(text: &str) -> Option<(NaiveDate, DateTime<FixedOffset>)> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?;
    let midnight = upstream_local(date.and_hms_opt(0, 0, 0)?)?;
    Some((date, midnight))
}

const LOCAL_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y%m%d%H%M%S",
];

/// Parse an upstream local time such as `2026-02-12 15:00` or `20260212150000`.
pub fn parse_hour(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    let naive = LOCAL_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())?;
    upstream_local(naive)
}
