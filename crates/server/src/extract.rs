//! Request extractors and field parsers that fail with [`ApiError`] bodies.

use axum::extract::{FromRequest, FromRequestParts};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::error::ApiError;

/// `axum::Json` with malformed bodies reported as `400 {"error": ...}`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with unparseable query strings reported as `400 {"error": ...}`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path ids that are not UUIDs cannot name anything, so they read as missing.
pub fn parse_path_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("{what} not found")))
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM[:SS]` in UTC, and bare dates at midnight UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

pub fn required_datetime(raw: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_datetime(raw).ok_or_else(|| ApiError::BadRequest(format!("Invalid {field}")))
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
/// Use together with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trimmed, non-empty text or `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_datetime_accepts_client_formats() {
        let midnight = Utc.with_ymd_and_hms(2024, 12, 20, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-12-20"), Some(midnight));
        assert_eq!(parse_datetime("2024-12-20T00:00:00Z"), Some(midnight));
        assert_eq!(parse_datetime("2024-12-20T03:00:00+03:00"), Some(midnight));
        assert_eq!(parse_datetime("2024-12-20T00:00"), Some(midnight));
        assert_eq!(parse_datetime("2024-12-20T00:00:00.000"), Some(midnight));
        assert_eq!(parse_datetime("next friday"), None);
        assert_eq!(parse_datetime(""), None);
    }

    #[test]
    fn nullable_tells_null_from_absent() {
        #[derive(Deserialize)]
        struct Patch {
            #[serde(default, deserialize_with = "nullable")]
            description: Option<Option<String>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.description, None);
        let null: Patch = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(null.description, Some(None));
        let set: Patch = serde_json::from_str(r#"{"description":"x"}"#).unwrap();
        assert_eq!(set.description, Some(Some("x".to_string())));
    }

    #[test]
    fn bad_path_ids_are_not_found() {
        let err = parse_path_id("42", "Task").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(msg) if msg == "Task not found"));
    }
}
