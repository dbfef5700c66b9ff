//! Field normalization: pure conversions from raw Bitable field values
//! into canonical scalars. No I/O happens here.
//!
//! The Bitable API is loosely typed: the "same" column can arrive as a
//! plain scalar, an array of scalars, an array of `{text}`/`{name}`
//! objects, or a JSON-encoded string, depending on the column type and
//! its history. Everything funnels through [`normalize_scalar`] so the
//! mapper only ever sees trimmed, whitespace-collapsed strings.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// How multi-valued source fields collapse into one string.
///
/// Both behaviors exist in historical variants of this pipeline, so the
/// choice is explicit configuration rather than a hardcoded policy.
/// `FirstOnly` keeps the first element of a multi-select;
/// `JoinComma` joins all normalized elements with `", "`. Search shadow
/// columns inherit whichever policy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiValuePolicy {
    #[default]
    FirstOnly,
    JoinComma,
}

impl std::str::FromStr for MultiValuePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first" | "first_only" => Ok(Self::FirstOnly),
            "join" | "join_comma" => Ok(Self::JoinComma),
            other => Err(format!("unknown multi-value policy: {other}")),
        }
    }
}

/// Normalize one raw field value into a canonical display string.
///
/// Rules, applied in order and recursively:
/// - null and empty strings become `None`;
/// - arrays collapse per [`MultiValuePolicy`] (empty array → `None`);
/// - objects yield their `text`, then `name`, then `url`/`tmp_url`/`link`
///   property (the latter trio covers image attachments);
/// - a string that looks like a JSON array literal is parsed and
///   re-normalized, falling back to the trimmed string on parse failure;
/// - everything else is stringified, trimmed, and internal whitespace
///   runs are collapsed to a single space.
///
/// Idempotent on its own output: feeding a returned string back in
/// yields the same string.
#[must_use]
pub fn normalize_scalar(value: &Value, policy: MultiValuePolicy) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(items) => match policy {
            MultiValuePolicy::FirstOnly => items
                .first()
                .and_then(|first| normalize_scalar(first, policy)),
            MultiValuePolicy::JoinComma => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| normalize_scalar(item, policy))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
        },
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("name"))
            .or_else(|| map.get("url"))
            .or_else(|| map.get("tmp_url"))
            .or_else(|| map.get("link"))
            .and_then(|inner| normalize_scalar(inner, policy)),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            // Some columns store their array payload JSON-encoded.
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                    return normalize_scalar(&parsed, policy);
                }
            }
            Some(collapse_whitespace(trimmed))
        }
    }
}

/// Derive the search-normalized form of a display string: lower-cased,
/// Unicode-decomposed with combining marks stripped, `đ`/`Đ` replaced
/// with `d`, whitespace collapsed.
///
/// Used only for the underscore-prefixed shadow columns; display
/// columns keep their diacritics.
#[must_use]
pub fn normalize_search_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .map(|ch| if ch == 'đ' { 'd' } else { ch })
        .collect();
    collapse_whitespace(stripped.trim())
}

/// A rendered calendar date plus the epoch milliseconds it came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedTimestamp {
    /// Zero-padded `YYYY/MM/DD` in the configured fixed zone.
    pub time: Option<String>,
    /// Epoch milliseconds.
    pub time_raw: Option<i64>,
}

/// Normalize a timestamp field, consulting `fallback` when the primary
/// value yields nothing.
///
/// Accepted encodings, in order: finite positive epoch-millis numbers
/// (or numeric strings), a string already in `YYYY/MM/DD` form (passed
/// through unchanged to avoid drift from re-rendering), and date
/// strings in the common RFC 3339 / `YYYY-MM-DD` shapes. The calendar
/// date is always rendered in `tz`, never the host zone, so the same
/// record renders identically regardless of where the sync runs.
#[must_use]
pub fn normalize_timestamp(
    primary: Option<&Value>,
    fallback: Option<&Value>,
    tz: FixedOffset,
) -> NormalizedTimestamp {
    for value in [primary, fallback].into_iter().flatten() {
        if let Some(normalized) = timestamp_from_value(value, tz) {
            return normalized;
        }
    }
    NormalizedTimestamp::default()
}

fn timestamp_from_value(value: &Value, tz: FixedOffset) -> Option<NormalizedTimestamp> {
    let scalar = match value {
        Value::Number(number) => return from_epoch_millis(number.as_f64()?, tz),
        Value::String(text) => text.trim().to_string(),
        other => normalize_scalar(other, MultiValuePolicy::FirstOnly)?,
    };
    if scalar.is_empty() {
        return None;
    }

    // Already-rendered dates pass through untouched.
    if is_ymd_slash(&scalar) {
        let date = parse_ymd_slash(&scalar)?;
        let millis = tz
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .single()?
            .timestamp_millis();
        return Some(NormalizedTimestamp {
            time: Some(scalar),
            time_raw: Some(millis),
        });
    }

    if let Ok(number) = scalar.parse::<f64>() {
        return from_epoch_millis(number, tz);
    }

    parse_date_string(&scalar, tz).and_then(|millis| from_epoch_millis(millis as f64, tz))
}

fn from_epoch_millis(millis: f64, tz: FixedOffset) -> Option<NormalizedTimestamp> {
    if !millis.is_finite() || millis <= 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = millis as i64;
    let rendered = DateTime::<Utc>::from_timestamp_millis(millis)?
        .with_timezone(&tz)
        .format("%Y/%m/%d")
        .to_string();
    Some(NormalizedTimestamp {
        time: Some(rendered),
        time_raw: Some(millis),
    })
}

fn parse_date_string(text: &str, tz: FixedOffset) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(tz.from_local_datetime(&parsed).single()?.timestamp_millis());
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(
            tz.from_local_datetime(&parsed.and_hms_opt(0, 0, 0)?)
                .single()?
                .timestamp_millis(),
        );
    }
    None
}

fn is_ymd_slash(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'/'
        && bytes[7] == b'/'
        && bytes
            .iter()
            .enumerate()
            .all(|(index, byte)| index == 4 || index == 7 || byte.is_ascii_digit())
}

fn parse_ymd_slash(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y/%m/%d").ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tz_plus_seven() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    #[test]
    fn scalar_null_and_empty_are_none() {
        assert_eq!(normalize_scalar(&Value::Null, MultiValuePolicy::FirstOnly), None);
        assert_eq!(normalize_scalar(&json!(""), MultiValuePolicy::FirstOnly), None);
        assert_eq!(normalize_scalar(&json!("   "), MultiValuePolicy::FirstOnly), None);
        assert_eq!(normalize_scalar(&json!([]), MultiValuePolicy::FirstOnly), None);
    }

    #[test]
    fn scalar_picks_first_array_element() {
        let value = json!(["USSH", "UIT"]);
        assert_eq!(
            normalize_scalar(&value, MultiValuePolicy::FirstOnly),
            Some("USSH".to_string())
        );
    }

    #[test]
    fn scalar_joins_array_under_join_policy() {
        let value = json!(["Thẻ sinh viên", "Ví"]);
        assert_eq!(
            normalize_scalar(&value, MultiValuePolicy::JoinComma),
            Some("Thẻ sinh viên, Ví".to_string())
        );
    }

    #[test]
    fn scalar_prefers_text_then_name_then_url() {
        assert_eq!(
            normalize_scalar(&json!({"text": "Ví da", "name": "x"}), MultiValuePolicy::FirstOnly),
            Some("Ví da".to_string())
        );
        assert_eq!(
            normalize_scalar(&json!({"name": "Khu A"}), MultiValuePolicy::FirstOnly),
            Some("Khu A".to_string())
        );
        assert_eq!(
            normalize_scalar(
                &json!({"file_token": "t", "url": "https://img.example/a.png"}),
                MultiValuePolicy::FirstOnly
            ),
            Some("https://img.example/a.png".to_string())
        );
        assert_eq!(
            normalize_scalar(&json!({"other": 1}), MultiValuePolicy::FirstOnly),
            None
        );
    }

    #[test]
    fn scalar_reparses_json_array_literal_strings() {
        assert_eq!(
            normalize_scalar(&json!("[\"Thẻ sinh viên\"]"), MultiValuePolicy::FirstOnly),
            Some("Thẻ sinh viên".to_string())
        );
        // Parse failure falls back to the trimmed string.
        assert_eq!(
            normalize_scalar(&json!("[not json]"), MultiValuePolicy::FirstOnly),
            Some("[not json]".to_string())
        );
    }

    #[test]
    fn scalar_collapses_whitespace_runs() {
        assert_eq!(
            normalize_scalar(&json!("  Thẻ   sinh \t viên  "), MultiValuePolicy::FirstOnly),
            Some("Thẻ sinh viên".to_string())
        );
    }

    #[test]
    fn scalar_is_idempotent_on_its_output() {
        let inputs = [
            json!("  a   b  "),
            json!(["x", "y"]),
            json!({"text": " hello  world "}),
            json!("[1, 2]"),
            json!(12.5),
            json!(true),
        ];
        for (policy_name, policy) in [
            ("first", MultiValuePolicy::FirstOnly),
            ("join", MultiValuePolicy::JoinComma),
        ] {
            for input in &inputs {
                let once = normalize_scalar(input, policy);
                let twice = once
                    .as_deref()
                    .and_then(|text| normalize_scalar(&json!(text), policy));
                assert_eq!(once, twice, "policy {policy_name}, input {input}");
            }
        }
    }

    #[test]
    fn search_text_strips_vietnamese_diacritics() {
        assert_eq!(normalize_search_text("Đã Duyệt"), "da duyet");
        assert_eq!(normalize_search_text("Thẻ Sinh Viên"), "the sinh vien");
        assert_eq!(normalize_search_text("  Mất   Ví  "), "mat vi");
    }

    #[test]
    fn timestamp_renders_epoch_millis_in_fixed_zone() {
        let result = normalize_timestamp(Some(&json!(1_700_000_000_000_i64)), None, tz_plus_seven());
        // 2023-11-14 22:13:20 UTC is already 2023-11-15 in UTC+7.
        assert_eq!(result.time.as_deref(), Some("2023/11/15"));
        assert_eq!(result.time_raw, Some(1_700_000_000_000));
    }

    #[test]
    fn timestamp_accepts_numeric_strings() {
        let result = normalize_timestamp(Some(&json!("1700000000000")), None, tz_plus_seven());
        assert_eq!(result.time_raw, Some(1_700_000_000_000));
    }

    #[test]
    fn timestamp_passes_through_rendered_dates() {
        let result = normalize_timestamp(Some(&json!("2025/11/14")), None, tz_plus_seven());
        assert_eq!(result.time.as_deref(), Some("2025/11/14"));
        // Midnight 2025-11-14 at UTC+7.
        assert_eq!(result.time_raw, Some(1_763_053_200_000));
    }

    #[test]
    fn timestamp_consults_fallback() {
        let result = normalize_timestamp(
            Some(&json!("not a date")),
            Some(&json!(1_700_000_000_000_i64)),
            tz_plus_seven(),
        );
        assert_eq!(result.time_raw, Some(1_700_000_000_000));
    }

    #[test]
    fn timestamp_rejects_non_positive_and_garbage() {
        let tz = tz_plus_seven();
        assert_eq!(normalize_timestamp(Some(&json!(0)), None, tz), NormalizedTimestamp::default());
        assert_eq!(normalize_timestamp(Some(&json!(-5)), None, tz), NormalizedTimestamp::default());
        assert_eq!(normalize_timestamp(None, None, tz), NormalizedTimestamp::default());
        assert_eq!(
            normalize_timestamp(Some(&json!("soon")), Some(&json!("later")), tz),
            NormalizedTimestamp::default()
        );
    }

    #[test]
    fn timestamp_parses_date_strings_in_target_zone() {
        let result = normalize_timestamp(Some(&json!("2025-11-14")), None, tz_plus_seven());
        assert_eq!(result.time.as_deref(), Some("2025/11/14"));
        assert_eq!(result.time_raw, Some(1_763_053_200_000));
    }

    #[test]
    fn multi_value_policy_parses_from_config_strings() {
        assert_eq!("first".parse::<MultiValuePolicy>(), Ok(MultiValuePolicy::FirstOnly));
        assert_eq!("JOIN".parse::<MultiValuePolicy>(), Ok(MultiValuePolicy::JoinComma));
        assert!("both".parse::<MultiValuePolicy>().is_err());
    }
}
