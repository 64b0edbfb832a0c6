use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;
use strum::EnumIter;
use thiserror::Error;
use tracing::debug;

use super::location::LocationDescriptor;
use crate::secret::ApiKey;

pub const DEFAULT_BASE_URL: &str = "https://api.map.baidu.com/weather/v1/";

/// Upper bound on a single upstream call, connect to last byte.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// District used to check whether a key is accepted (Beijing).
const PROBE_DISTRICT_ID: &str = "110100";

/// Upstream status codes that reject the key itself (missing, invalid, disabled,
/// IP/referer whitelist, service not enabled, permanent quota exhausted).
const AUTH_STATUSES: &[i64] = &[1, 2, 3, 4, 5, 200, 201, 202, 211, 220, 240, 301];

/// Upstream status codes for daily quota and concurrency limits.
const RATE_LIMIT_STATUSES: &[i64] = &[302, 401, 402];

/// Numeric sentinel the upstream uses for "no reading".
const ABNORMAL_NUMBER: f64 = 999999.0;
/// Text sentinel the upstream uses for "no reading".
const ABNORMAL_TEXT: &str = "暂无";

/// The five upstream calls making up one refresh cycle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EndpointKind {
    Current,
    Hourly,
    Daily,
    Alerts,
    AirQuality,
}

impl EndpointKind {
    /// Value of the upstream `data_type` parameter.
    ///
    /// Air quality has no dedicated data type; it is read from the pollutant
    /// fields of its own `now` call.
    pub fn data_type(self) -> &'static str {
        match self {
            EndpointKind::Current | EndpointKind::AirQuality => "now",
            EndpointKind::Hourly => "fc_hour",
            EndpointKind::Daily => "fc",
            EndpointKind::Alerts => "alert",
        }
    }
}

/// Gateway failure, classified by what the caller should do about it.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// The key was rejected. Retrying with the same key is pointless.
    #[error("authentication rejected (status {status}): {message}")]
    Auth { status: i64, message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// Network failure, timeout, or an HTTP-level server error.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The body did not match the expected schema.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// Any other non-zero upstream status.
    #[error("upstream error (status {status}): {message}")]
    Upstream { status: i64, message: String },
}

impl FetchError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }

    fn malformed(message: impl Into<String>) -> Self {
        FetchError::Malformed {
            message: message.into(),
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        // The URL carries the key in its query string.
        let err = err.without_url();
        let message = if err.is_timeout() {
            format!("request timed out after {}s", REQUEST_TIMEOUT.as_secs())
        } else {
            err.to_string()
        };
        FetchError::Transport { message }
    }
}

/// Map a non-zero upstream status onto an error class.
fn classify_status(status: i64, message: Option<String>) -> FetchError {
    let message = message.unwrap_or_else(|| "unknown error".to_string());
    if AUTH_STATUSES.contains(&status) {
        FetchError::Auth { status, message }
    } else if RATE_LIMIT_STATUSES.contains(&status) {
        FetchError::RateLimited {
            message: format!("status {}: {}", status, message),
        }
    } else {
        FetchError::Upstream { status, message }
    }
}

fn classify_http(status: reqwest::StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    let code = i64::from(status.as_u16());
    let message = format!("HTTP {}", status);
    Some(match status.as_u16() {
        401 | 403 => FetchError::Auth {
            status: code,
            message,
        },
        429 => FetchError::RateLimited { message },
        500..=599 => FetchError::Transport { message },
        _ => FetchError::Upstream {
            status: code,
            message,
        },
    })
}

/// Place the upstream resolved the request to.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireLocation {
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
}

/// The `now` object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireNow {
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rh: Option<f64>,
    pub wind_class: Option<String>,
    pub wind_dir: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub wind_angle: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub prec_1h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub clouds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub vis: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub aqi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pm25: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pm10: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub no2: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub so2: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub o3: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub co: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub uvi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub dpt: Option<f64>,
    pub uptime: Option<String>,
}

/// One entry of `forecasts`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireDaily {
    pub date: Option<String>,
    pub week: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub low: Option<f64>,
    pub wc_day: Option<String>,
    pub wc_night: Option<String>,
    pub wd_day: Option<String>,
    pub wd_night: Option<String>,
    pub text_day: Option<String>,
    pub text_night: Option<String>,
}

/// One entry of `forecast_hours`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireHourly {
    pub data_time: Option<String>,
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub temp_fc: Option<f64>,
    pub wind_class: Option<String>,
    pub wind_dir: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub wind_angle: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rh: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub prec_1h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub clouds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pop: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub uvi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub dpt: Option<f64>,
}

/// One entry of `alerts`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireAlert {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub level: Option<String>,
    pub title: Option<String>,
    pub desc: Option<String>,
}

/// Accept numbers sent either as JSON numbers or as numeric strings.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => Some(n),
        Some(NumberOrText::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

#[derive(Deserialize)]
struct Envelope {
    status: i64,
    #[serde(default, alias = "msg")]
    message: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Deserialize)]
struct WireResult {
    location: Option<WireLocation>,
    now: Option<WireNow>,
    forecasts: Option<Vec<WireDaily>>,
    forecast_hours: Option<Vec<WireHourly>>,
    alerts: Option<Vec<WireAlert>>,
}

/// Decoded body of one endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    Current(WireNow),
    Hourly(Vec<WireHourly>),
    Daily(Vec<WireDaily>),
    Alerts(Vec<WireAlert>),
    AirQuality(WireNow),
}

/// A successful endpoint response, tagged with its kind and fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub kind: EndpointKind,
    pub fetched_at: DateTime<Utc>,
    pub location: Option<WireLocation>,
    pub body: RawBody,
}

/// Replace the upstream "no reading" sentinels with null, recursively.
pub fn clean_sentinels(value: &mut Value) {
    let is_sentinel = match value {
        Value::Number(n) => n.as_f64() == Some(ABNORMAL_NUMBER),
        Value::String(s) => s == ABNORMAL_TEXT,
        _ => false,
    };
    if is_sentinel {
        *value = Value::Null;
        return;
    }

    match value {
        Value::Object(map) => map.values_mut().for_each(clean_sentinels),
        Value::Array(items) => items.iter_mut().for_each(clean_sentinels),
        _ => {}
    }
}

/// Validate an upstream response body and extract the section for `kind`.
pub fn decode(
    kind: EndpointKind,
    body: Value,
    fetched_at: DateTime<Utc>,
) -> Result<RawPayload, FetchError> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| FetchError::malformed(format!("invalid envelope: {}", e)))?;
    if envelope.status != 0 {
        return Err(classify_status(envelope.status, envelope.message));
    }

    let mut result = envelope
        .result
        .ok_or_else(|| FetchError::malformed("missing result object"))?;
    clean_sentinels(&mut result);
    let result: WireResult = serde_json::from_value(result)
        .map_err(|e| FetchError::malformed(format!("invalid result: {}", e)))?;

    let body = match kind {
        EndpointKind::Current => RawBody::Current(
            result
                .now
                .ok_or_else(|| FetchError::malformed("missing now object"))?,
        ),
        EndpointKind::Hourly => RawBody::Hourly(
            result
                .forecast_hours
                .ok_or_else(|| FetchError::malformed("missing forecast_hours list"))?,
        ),
        EndpointKind::Daily => RawBody::Daily(
            result
                .forecasts
                .ok_or_else(|| FetchError::malformed("missing forecasts list"))?,
        ),
        // No alerts in force is reported by omitting the list.
        EndpointKind::Alerts => RawBody::Alerts(result.alerts.unwrap_or_default()),
        EndpointKind::AirQuality => {
            let now = result
                .now
                .ok_or_else(|| FetchError::malformed("missing now object"))?;
            if now.aqi.is_none() {
                return Err(FetchError::malformed("no air quality reading"));
            }
            RawBody::AirQuality(now)
        }
    };

    Ok(RawPayload {
        kind,
        fetched_at,
        location: result.location,
        body,
    })
}

/// Source of raw weather payloads.
///
/// One call is exactly one upstream request: no caching, no retries.
#[async_trait]
pub trait WeatherGateway: Send + Sync {
    async fn fetch(
        &self,
        kind: EndpointKind,
        location: &LocationDescriptor,
        api_key: &ApiKey,
    ) -> Result<RawPayload, FetchError>;
}

/// Gateway speaking to the Baidu Maps weather service over HTTPS.
#[derive(Debug, Clone)]
pub struct BaiduGateway {
    client: reqwest::Client,
    base_url: String,
}

impl BaiduGateway {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Gateway against a different endpoint, e.g. a local mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::transport)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Probe whether the upstream accepts `api_key`.
    ///
    /// Returns `Ok(false)` for an authentication rejection; any other failure is
    /// propagated since it says nothing about the key.
    pub async fn validate_key(&self, api_key: &ApiKey) -> Result<bool, FetchError> {
        let params = vec![("district_id", PROBE_DISTRICT_ID.to_string())];
        match self.request(EndpointKind::Current, params, api_key).await {
            Ok(_) => Ok(true),
            Err(FetchError::Auth { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn request(
        &self,
        kind: EndpointKind,
        mut params: Vec<(&'static str, String)>,
        api_key: &ApiKey,
    ) -> Result<RawPayload, FetchError> {
        params.push(("data_type", kind.data_type().to_string()));
        params.push(("output", "json".to_string()));
        params.push(("ak", api_key.expose().to_string()));

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(FetchError::transport)?;

        if let Some(err) = classify_http(response.status()) {
            return Err(err);
        }

        let bytes = response.bytes().await.map_err(FetchError::transport)?;
        let fetched_at = Utc::now();
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::malformed(format!("body is not JSON: {}", e)))?;

        decode(kind, body, fetched_at)
    }
}

#[async_trait]
impl WeatherGateway for BaiduGateway {
    async fn fetch(
        &self,
        kind: EndpointKind,
        location: &LocationDescriptor,
        api_key: &ApiKey,
    ) -> Result<RawPayload, FetchError> {
        debug!(endpoint = %kind, %location, "Fetching weather data");
        let result = self.request(kind, location.query_params(), api_key).await;
        if let Err(e) = &result {
            debug!(endpoint = %kind, error = %e, "Weather fetch failed");
        }
        result
    }
}

/// Scripted gateway for tests.
#[cfg(test)]
pub(crate) struct MockGateway {
    results: std::sync::Mutex<std::collections::BTreeMap<EndpointKind, Result<RawPayload, FetchError>>>,
    calls: std::sync::Mutex<Vec<EndpointKind>>,
    delay: std::sync::Mutex<Duration>,
}

#[cfg(test)]
impl MockGateway {
    /// A gateway answering every endpoint from the shared fixture.
    pub(crate) fn new() -> Self {
        let gateway = Self {
            results: Default::default(),
            calls: Default::default(),
            delay: Default::default(),
        };
        gateway.succeed_all();
        gateway
    }

    pub(crate) fn set(&self, kind: EndpointKind, result: Result<RawPayload, FetchError>) {
        self.results.lock().unwrap().insert(kind, result);
    }

    pub(crate) fn fail(&self, kind: EndpointKind, err: FetchError) {
        self.set(kind, Err(err));
    }

    pub(crate) fn fail_all(&self, err: FetchError) {
        use strum::IntoEnumIterator;
        for kind in EndpointKind::iter() {
            self.fail(kind, err.clone());
        }
    }

    pub(crate) fn succeed_all(&self) {
        use strum::IntoEnumIterator;
        for kind in EndpointKind::iter() {
            self.set(kind, Ok(super::fixtures::payload(kind)));
        }
    }

    /// Make every call take `delay` before answering.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl WeatherGateway for MockGateway {
    async fn fetch(
        &self,
        kind: EndpointKind,
        _location: &LocationDescriptor,
        _api_key: &ApiKey,
    ) -> Result<RawPayload, FetchError> {
        self.calls.lock().unwrap().push(kind);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.results
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Transport {
                    message: "no scripted response".to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::weather::fixtures;

    #[test]
    fn test_decode_each_kind() {
        let current = fixtures::payload(EndpointKind::Current);
        match &current.body {
            RawBody::Current(now) => {
                assert_eq!(now.temp, Some(25.0));
                assert_eq!(now.text.as_deref(), Some("晴"));
            }
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(
            current.location.as_ref().and_then(|l| l.name.as_deref()),
            Some("海淀区")
        );

        match fixtures::payload(EndpointKind::Hourly).body {
            RawBody::Hourly(hours) => assert_eq!(hours.len(), 2),
            other => panic!("unexpected body {:?}", other),
        }
        match fixtures::payload(EndpointKind::Daily).body {
            RawBody::Daily(days) => assert_eq!(days[1].text_night.as_deref(), Some("小雨")),
            other => panic!("unexpected body {:?}", other),
        }
        match fixtures::payload(EndpointKind::Alerts).body {
            RawBody::Alerts(alerts) => assert_eq!(alerts[0].kind.as_deref(), Some("大风")),
            other => panic!("unexpected body {:?}", other),
        }
        match fixtures::payload(EndpointKind::AirQuality).body {
            RawBody::AirQuality(now) => assert_eq!(now.pm25, Some(35.0)),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_sentinels_become_null() {
        let mut body = fixtures::response();
        body["result"]["now"]["temp"] = json!(999999);
        body["result"]["now"]["wind_dir"] = json!("暂无");
        let payload = fixtures::payload_from(EndpointKind::Current, body);
        let RawBody::Current(now) = payload.body else {
            panic!("expected current body");
        };
        assert_eq!(now.temp, None);
        assert_eq!(now.wind_dir, None);
        assert_eq!(now.feels_like, Some(27.0));
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let mut body = fixtures::response();
        body["result"]["now"]["temp"] = json!("-3");
        let payload = fixtures::payload_from(EndpointKind::Current, body);
        let RawBody::Current(now) = payload.body else {
            panic!("expected current body");
        };
        assert_eq!(now.temp, Some(-3.0));
    }

    #[test]
    fn test_missing_alerts_is_empty() {
        let mut body = fixtures::response();
        body["result"].as_object_mut().unwrap().remove("alerts");
        let payload = fixtures::payload_from(EndpointKind::Alerts, body);
        assert_eq!(payload.body, RawBody::Alerts(vec![]));
    }

    #[test]
    fn test_missing_section_is_malformed() {
        let mut body = fixtures::response();
        body["result"].as_object_mut().unwrap().remove("forecast_hours");
        let err = decode(EndpointKind::Hourly, body, Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));

        let mut body = fixtures::response();
        body["result"]["now"]["aqi"] = json!(999999);
        let err = decode(EndpointKind::AirQuality, body, Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_wrong_types_are_malformed() {
        let body = json!({"status": 0, "result": {"forecasts": "soon"}});
        let err = decode(EndpointKind::Daily, body, Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));

        let err = decode(EndpointKind::Daily, json!([1, 2]), Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_status_classification() {
        for status in [1, 2, 5, 200, 211, 240, 301] {
            let body = json!({"status": status, "message": "APP不存在"});
            let err = decode(EndpointKind::Current, body, Utc::now()).unwrap_err();
            assert!(err.is_auth(), "status {}", status);
        }

        let body = json!({"status": 302, "message": "天配额超限"});
        let err = decode(EndpointKind::Current, body, Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { .. }));

        let body = json!({"status": 36, "msg": "参数错误"});
        let err = decode(EndpointKind::Current, body, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            FetchError::Upstream {
                status: 36,
                message: "参数错误".to_string()
            }
        );
    }

    #[test]
    fn test_http_classification() {
        assert!(classify_http(reqwest::StatusCode::OK).is_none());
        assert!(classify_http(reqwest::StatusCode::FORBIDDEN)
            .unwrap()
            .is_auth());
        assert!(matches!(
            classify_http(reqwest::StatusCode::TOO_MANY_REQUESTS),
            Some(FetchError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_http(reqwest::StatusCode::BAD_GATEWAY),
            Some(FetchError::Transport { .. })
        ));
    }

    #[test]
    fn test_fetch_error_serializes_with_kind_tag() {
        let err = FetchError::Auth {
            status: 200,
            message: "APP不存在".to_string(),
        };
        insta::assert_snapshot!(
            serde_json::to_string(&err).unwrap(),
            @r#"{"kind":"auth","status":200,"message":"APP不存在"}"#
        );
    }

    #[test]
    fn test_data_types() {
        assert_eq!(EndpointKind::Current.data_type(), "now");
        assert_eq!(EndpointKind::Hourly.data_type(), "fc_hour");
        assert_eq!(EndpointKind::Daily.data_type(), "fc");
        assert_eq!(EndpointKind::Alerts.data_type(), "alert");
        assert_eq!(EndpointKind::AirQuality.data_type(), "now");
        assert_eq!(EndpointKind::AirQuality.to_string(), "air_quality");
    }
}
