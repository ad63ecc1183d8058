use reqwest::StatusCode;
use reqwest::header::{ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;

use crate::types::{HistoryPeriod, HistoryRecord, OperatingMode, Thermostat, Zone};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.mynexia.com";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub const CSRF_HEADER: &str = "X-CSRF-Token";

pub const LOGIN_PATH: &str = "/login";
pub const SESSION_PATH: &str = "/session";
pub const ROOT_PATH: &str = "/";

pub fn climate_path(house_id: u64) -> String {
    format!("/houses/{house_id}/climate")
}

pub fn setpoints_path(house_id: u64, zone_id: u64) -> String {
    format!("/houses/{house_id}/xxl_zones/{zone_id}/setpoints")
}

pub fn history_path(thermostat_id: u64, period: HistoryPeriod) -> String {
    format!("/xxl_history/{thermostat_id}/{}", period.file_name())
}

/// Headers sent on every request; the portal serves different markup to
/// clients that do not look like a browser.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

pub fn login_form<'a>(
    login: &'a str,
    password: &'a str,
    token: &'a str,
) -> [(&'static str, &'a str); 4] {
    [
        ("utf8", "\u{2713}"),
        ("authenticity_token", token),
        ("login", login),
        ("password", password),
    ]
}

pub fn is_permanent_redirect(status: StatusCode) -> bool {
    status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::PERMANENT_REDIRECT
}

/// Body of a setpoints PUT. The portal requires both setpoints on every
/// write, each as the raw value and as a whole number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetpointPayload {
    pub cooling_setpoint: f64,
    pub cooling_integer: i64,
    pub heating_setpoint: f64,
    pub heating_integer: i64,
}

impl SetpointPayload {
    pub fn new(cooling: f64, heating: f64) -> Self {
        Self {
            cooling_setpoint: cooling,
            cooling_integer: cooling.round() as i64,
            heating_setpoint: heating,
            heating_integer: heating.round() as i64,
        }
    }

    /// Replace the setpoint of the active mode and carry the other one over
    /// unchanged from the zone.
    pub fn for_mode(mode: &OperatingMode, zone: &Zone, temperature: f64) -> Result<Self> {
        match mode {
            OperatingMode::Cool => Ok(Self::new(temperature, zone.heating_setpoint)),
            OperatingMode::Heat => Ok(Self::new(zone.cooling_setpoint, temperature)),
            OperatingMode::Other(_) => Err(Error::UnsupportedMode(mode.clone())),
        }
    }
}

/// Decode the raw embedded array. Also returns the generic JSON value for
/// the traffic log.
pub fn decode_thermostats(raw: &str) -> Result<(Vec<Thermostat>, Value)> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::MarkupChanged(format!("embedded array: {e}")))?;
    let thermostats = serde_json::from_value(value.clone())
        .map_err(|e| Error::MarkupChanged(format!("thermostat list: {e}")))?;
    Ok((thermostats, value))
}

/// Parse a history CSV, first row being the header.
pub fn parse_history_csv(body: &str) -> Result<Vec<HistoryRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        records.push(
            headers
                .iter()
                .zip(row.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_headers_look_like_a_browser() {
        let headers = default_headers();
        let ua = headers[USER_AGENT].to_str().unwrap();
        assert!(ua.starts_with("Mozilla/5.0"));
        assert_eq!(headers[ACCEPT_LANGUAGE], BROWSER_ACCEPT_LANGUAGE);
        assert_eq!(headers[CONNECTION], "keep-alive");
    }

    fn zone() -> Zone {
        Zone {
            id: Some(5),
            temperature: 72.0,
            cooling_setpoint: 75.0,
            heating_setpoint: 68.0,
        }
    }

    #[test]
    fn cool_mode_keeps_heating_setpoint() {
        let p = SetpointPayload::for_mode(&OperatingMode::Cool, &zone(), 73.0).unwrap();
        assert_eq!(p.cooling_setpoint, 73.0);
        assert_eq!(p.heating_setpoint, 68.0);
    }

    #[test]
    fn heat_mode_keeps_cooling_setpoint() {
        let p = SetpointPayload::for_mode(&OperatingMode::Heat, &zone(), 66.5).unwrap();
        assert_eq!(p.heating_setpoint, 66.5);
        assert_eq!(p.heating_integer, 67);
        assert_eq!(p.cooling_setpoint, 75.0);
        assert_eq!(p.cooling_integer, 75);
    }

    #[test]
    fn other_mode_is_rejected() {
        let mode = OperatingMode::Other("AUTO".into());
        let err = SetpointPayload::for_mode(&mode, &zone(), 70.0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMode(OperatingMode::Other(ref m)) if m == "AUTO"));
    }

    #[test]
    fn payload_serializes_all_four_fields() {
        let json = serde_json::to_value(SetpointPayload::new(75.0, 68.0)).unwrap();
        assert_eq!(json["cooling_setpoint"], 75.0);
        assert_eq!(json["cooling_integer"], 75);
        assert_eq!(json["heating_setpoint"], 68.0);
        assert_eq!(json["heating_integer"], 68);
    }

    #[test]
    fn paths() {
        assert_eq!(climate_path(42), "/houses/42/climate");
        assert_eq!(setpoints_path(42, 7), "/houses/42/xxl_zones/7/setpoints");
        assert_eq!(
            history_path(3, HistoryPeriod::Monthly),
            "/xxl_history/3/monthly_history.csv"
        );
    }

    #[test]
    fn permanent_redirects() {
        assert!(is_permanent_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_permanent_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_permanent_redirect(StatusCode::FOUND));
    }

    #[test]
    fn history_csv_rows_keyed_by_header() {
        let rows = parse_history_csv("date,temp\n2020-01-01,70\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["date"], "2020-01-01");
        assert_eq!(rows[0]["temp"], "70");
    }

    #[test]
    fn history_csv_header_only() {
        assert!(parse_history_csv("date,temp\n").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let err = decode_thermostats(r#"[{"id":"x"}]"#).unwrap_err();
        assert!(matches!(err, Error::MarkupChanged(_)));
    }

    #[test]
    fn login_form_fields() {
        let form = login_form("me@example.com", "hunter2", "tok");
        assert_eq!(form[1], ("authenticity_token", "tok"));
        assert_eq!(form[2], ("login", "me@example.com"));
    }
}
