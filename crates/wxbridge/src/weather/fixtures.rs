//! Canned upstream responses shared by unit tests.

use chrono::TimeZone;
use chrono::Utc;
use serde_json::json;
use serde_json::Value;

use super::gateway::decode;
use super::gateway::EndpointKind;
use super::gateway::RawPayload;

/// A full successful upstream response for a Beijing district.
pub(crate) fn response() -> Value {
    json!({
        "status": 0,
        "message": "success",
        "result": {
            "location": {
                "country": "中国",
                "province": "北京市",
                "city": "北京市",
                "name": "海淀区",
                "id": "110108"
            },
            "now": {
                "text": "晴",
                "temp": 25,
                "feels_like": 27,
                "rh": 60,
                "wind_class": "3级",
                "wind_dir": "南风",
                "wind_angle": 180,
                "prec_1h": 0.0,
                "clouds": 20,
                "vis": 10000,
                "aqi": 75,
                "pm25": 35,
                "pm10": 50,
                "no2": 20,
                "so2": 5,
                "o3": 100,
                "co": 0.5,
                "uvi": 3,
                "pressure": 1012,
                "dpt": 16,
                "uptime": "20260212140000"
            },
            "forecasts": [
                {
                    "date": "2026-02-12",
                    "week": "星期四",
                    "high": 28,
                    "low": 18,
                    "wc_day": "3级",
                    "wc_night": "2级",
                    "wd_day": "南风",
                    "wd_night": "北风",
                    "text_day": "晴",
                    "text_night": "多云"
                },
                {
                    "date": "2026-02-13",
                    "week": "星期五",
                    "high": 26,
                    "low": 16,
                    "wc_day": "4级",
                    "wc_night": "3级",
                    "wd_day": "东南风",
                    "wd_night": "东风",
                    "text_day": "多云",
                    "text_night": "小雨"
                }
            ],
            "forecast_hours": [
                {
                    "data_time": "2026-02-12 16:00",
                    "text": "多云",
                    "temp_fc": 24,
                    "wind_class": "2级",
                    "wind_dir": "南风",
                    "wind_angle": 175,
                    "rh": 65,
                    "prec_1h": 0.0,
                    "clouds": 40,
                    "pop": 10
                },
                {
                    "data_time": "2026-02-12 15:00",
                    "text": "晴",
                    "temp_fc": 25,
                    "wind_class": "3级",
                    "wind_dir": "南风",
                    "wind_angle": 180,
                    "rh": 60,
                    "prec_1h": 0.0,
                    "clouds": 20,
                    "pop": 0
                }
            ],
            "alerts": [
                {
                    "type": "大风",
                    "level": "蓝色",
                    "title": "北京市气象台发布大风蓝色预警",
                    "desc": "预计未来24小时将出现5-6级大风。"
                }
            ]
        }
    })
}

/// Decode `body` as the given endpoint with a fixed fetch time.
pub(crate) fn payload_from(kind: EndpointKind, body: Value) -> RawPayload {
    let fetched_at = Utc.with_ymd_and_hms(2026, 2, 12, 6, 5, 0).unwrap();
    decode(kind, body, fetched_at).unwrap()
}

pub(crate) fn payload(kind: EndpointKind) -> RawPayload {
    payload_from(kind, response())
}
