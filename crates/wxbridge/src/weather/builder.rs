//! Assembles per-endpoint results into a [`WeatherSnapshot`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::Utc;
use tracing::warn;

use super::gateway::EndpointKind;
use super::gateway::FetchError;
use super::gateway::RawBody;
use super::gateway::RawPayload;
use super::gateway::WireDaily;
use super::gateway::WireHourly;
use super::gateway::WireLocation;
use super::gateway::WireNow;
use super::snapshot::AirQuality;
use super::snapshot::Alert;
use super::snapshot::CurrentConditions;
use super::snapshot::DailyForecast;
use super::snapshot::HalfDay;
use super::snapshot::HourlyForecast;
use super::snapshot::Place;
use super::snapshot::WeatherSnapshot;
use super::translate::parse_day;
use super::translate::parse_hour;
use super::translate::translate_aqi;
use super::translate::translate_condition;
use super::translate::translate_wind;
use super::translate::visibility_km;

pub const MAX_HOURLY: usize = 24;
pub const MAX_DAILY: usize = 7;

/// Outcome of one refresh cycle, keyed by endpoint.
pub type FetchResults = BTreeMap<EndpointKind, Result<RawPayload, FetchError>>;

/// Combine one cycle's results with the previous snapshot.
///
/// A successful endpoint replaces its section. A failed or missing endpoint keeps the
/// previous section verbatim (or leaves it empty when there is none) and is listed in
/// `partial_failures`.
pub fn build(previous: Option<&WeatherSnapshot>, results: &FetchResults) -> WeatherSnapshot {
    let mut failures = BTreeSet::new();

    let current = section(
        EndpointKind::Current,
        results,
        previous.and_then(|p| p.current.as_ref()),
        &mut failures,
        |payload| match &payload.body {
            RawBody::Current(now) => Some(current_from(now, payload.location.as_ref())),
            _ => None,
        },
    );

    let hourly = section(
        EndpointKind::Hourly,
        results,
        previous.and_then(|p| p.hourly.as_ref()),
        &mut failures,
        |payload| match &payload.body {
            RawBody::Hourly(hours) => Some(hourly_from(hours)),
            _ => None,
        },
    );

    let daily = section(
        EndpointKind::Daily,
        results,
        previous.and_then(|p| p.daily.as_ref()),
        &mut failures,
        |payload| match &payload.body {
            RawBody::Daily(days) => Some(days.iter().take(MAX_DAILY).map(daily_from).collect()),
            _ => None,
        },
    );

    let alerts = section(
        EndpointKind::Alerts,
        results,
        previous.and_then(|p| p.alerts.as_ref()),
        &mut failures,
        |payload| match &payload.body {
            RawBody::Alerts(alerts) => Some(
                alerts
                    .iter()
                    .map(|a| Alert {
                        kind: a.kind.clone(),
                        level: a.level.clone(),
                        title: a.title.clone(),
                        description: a.desc.clone(),
                    })
                    .collect(),
            ),
            _ => None,
        },
    );

    let air_quality = section(
        EndpointKind::AirQuality,
        results,
        previous.and_then(|p| p.air_quality.as_ref()),
        &mut failures,
        |payload| match &payload.body {
            RawBody::AirQuality(now) => air_quality_from(now),
            _ => None,
        },
    );

    let fetched_at = results
        .values()
        .filter_map(|r| r.as_ref().ok())
        .map(|p| p.fetched_at)
        .max()
        .or_else(|| previous.map(|p| p.fetched_at))
        .unwrap_or_else(Utc::now);

    WeatherSnapshot {
        current,
        hourly,
        daily,
        alerts,
        air_quality,
        fetched_at,
        partial_failures: failures,
    }
}

fn section<T: Clone>(
    kind: EndpointKind,
    results: &FetchResults,
    previous: Option<&T>,
    failures: &mut BTreeSet<EndpointKind>,
    convert: impl FnOnce(&RawPayload) -> Option<T>,
) -> Option<T> {
    let converted = match results.get(&kind) {
        Some(Ok(payload)) if payload.kind == kind => match convert(payload) {
            Some(section) => Ok(section),
            None => Err(format!("{} payload has a mismatched body", kind)),
        },
        Some(Ok(payload)) => Err(format!("received a {} payload", payload.kind)),
        Some(Err(e)) => Err(e.to_string()),
        None => Err("no result".to_string()),
    };

    match converted {
        Ok(section) => Some(section),
        Err(reason) => {
            warn!(
                endpoint = %kind,
                error = %reason,
                kept_previous = previous.is_some(),
                "Section not refreshed"
            );
            failures.insert(kind);
            previous.cloned()
        }
    }
}

fn place_from(location: &WireLocation) -> Place {
    Place {
        country: location.country.clone(),
        province: location.province.clone(),
        city: location.city.clone(),
        district: location.name.clone(),
        district_id: location.id.clone(),
    }
}

fn current_from(now: &WireNow, location: Option<&WireLocation>) -> CurrentConditions {
    let (condition, condition_text) = now.text.as_deref().map(translate_condition).unzip();
    CurrentConditions {
        condition,
        condition_text,
        temperature: now.temp,
        apparent_temperature: now.feels_like,
        humidity: now.rh,
        pressure: now.pressure,
        cloud_coverage: now.clouds,
        visibility: now.vis.map(visibility_km),
        uv_index: now.uvi,
        dew_point: now.dpt,
        precipitation_1h: now.prec_1h,
        wind: translate_wind(
            now.wind_angle,
            now.wind_class.as_deref(),
            now.wind_dir.as_deref(),
        ),
        updated_at: now.uptime.as_deref().and_then(parse_hour),
        place: location.map(place_from),
    }
}

fn hourly_from(hours: &[WireHourly]) -> Vec<HourlyForecast> {
    let mut forecasts: Vec<HourlyForecast> = hours
        .iter()
        .map(|hour| {
            let (condition, condition_text) =
                hour.text.as_deref().map(translate_condition).unzip();
            HourlyForecast {
                time: hour.data_time.as_deref().and_then(parse_hour),
                condition,
                condition_text,
                temperature: hour.temp_fc,
                humidity: hour.rh,
                precipitation: hour.prec_1h,
                precipitation_probability: hour.pop,
                cloud_coverage: hour.clouds,
                uv_index: hour.uvi,
                pressure: hour.pressure,
                dew_point: hour.dpt,
                wind: translate_wind(
                    hour.wind_angle,
                    hour.wind_class.as_deref(),
                    hour.wind_dir.as_deref(),
                ),
            }
        })
        .collect();

    // Entries without a parseable time keep upstream order.
    if forecasts.iter().all(|f| f.time.is_some()) {
        forecasts.sort_by_key(|f| f.time);
    }
    forecasts.truncate(MAX_HOURLY);
    forecasts
}

fn half_day(text: Option<&str>, class: Option<&str>, direction: Option<&str>) -> HalfDay {
    let (condition, condition_text) = text.map(translate_condition).unzip();
    HalfDay {
        condition,
        condition_text,
        wind: translate_wind(None, class, direction),
    }
}

fn daily_from(day: &WireDaily) -> DailyForecast {
    let (date, datetime) = day.date.as_deref().and_then(parse_day).unzip();
    DailyForecast {
        date,
        datetime,
        week: day.week.clone(),
        temperature_high: day.high,
        temperature_low: day.low,
        day: half_day(
            day.text_day.as_deref(),
            day.wc_day.as_deref(),
            day.wd_day.as_deref(),
        ),
        night: half_day(
            day.text_night.as_deref(),
            day.wc_night.as_deref(),
            day.wd_night.as_deref(),
        ),
    }
}

fn air_quality_from(now: &WireNow) -> Option<AirQuality> {
    let aqi = now.aqi?;
    Some(AirQuality {
        aqi,
        category: translate_aqi(aqi),
        pm25: now.pm25,
        pm10: now.pm10,
        no2: now.no2,
        so2: now.so2,
        o3: now.o3,
        co: now.co,
    })
}
