//! Record mapping: one remote record in, one canonical mirror row out.
//!
//! Mapping is total: a record with missing or malformed fields still
//! produces a row, with display columns degrading to `None` and typed
//! columns to their defaults. Per-record data quality issues never
//! abort a sync pass.

use chrono::FixedOffset;
use serde_json::Value;

use crate::models::{CanonicalRow, RemoteRecord};
use crate::normalize::{
    normalize_scalar, normalize_search_text, normalize_timestamp, MultiValuePolicy,
};

/// Value written to the `type` column when the source field is absent.
const DEFAULT_RECORD_TYPE: &str = "found";

/// Value written to the `status` column when the source field is absent
/// (the Bitable's pending-review label).
const DEFAULT_STATUS: &str = "Chờ duyệt";

/// Prioritized source field names per canonical column. The Bitable
/// schema is not versioned and several naming conventions coexist in
/// historical rows, so each column probes its aliases in order and the
/// first present value wins.
const NAME_FIELDS: &[&str] = &["TieuDe", "Title", "Name"];
const DESCRIPTION_FIELDS: &[&str] = &["MoTa", "Description"];
const IMAGE_FIELDS: &[&str] = &["HinhAnhURL", "HinhAnh", "Image"];
const TYPE_FIELDS: &[&str] = &["LoaiTin", "Type"];
const GROUP_FIELDS: &[&str] = &["Group", "Nhom"];
const DOC_TYPE_FIELDS: &[&str] = &["LoaiDo", "DocType"];
const KHU_VUC_FIELDS: &[&str] = &["KhuVuc", "ViTri"];
const TIME_FIELDS: &[&str] = &["ThoiGian", "Time"];
const TIME_FALLBACK_FIELDS: &[&str] = &["NgayDang", "CreatedTime"];
const PIN_FIELDS: &[&str] = &["Ghim", "Pinned", "IsPinned"];
const LATITUDE_FIELDS: &[&str] = &["Latitude", "Lat"];
const LONGITUDE_FIELDS: &[&str] = &["Longitude", "Lng", "Long"];
const STATUS_FIELDS: &[&str] = &["TrangThai", "Status"];
const EMAIL_FIELDS: &[&str] = &["EmailNguoiDang", "Email"];
const LIEN_HE_FIELDS: &[&str] = &["LienHe", "Contact"];
const LINK_FACEBOOK_FIELDS: &[&str] = &["LinkFacebook", "Facebook"];

/// Status phrases resolving to the `"found"` branch of the `type`
/// column, matched case- and diacritic-insensitively. Anything else
/// resolves to `"lost"`.
const FOUND_PHRASES: &[&str] = &["nhat duoc", "found"];

/// Mapper knobs that vary per deployment.
#[derive(Debug, Clone, Copy)]
pub struct MapperOptions {
    /// Fixed zone for rendering the `time` column.
    pub tz: FixedOffset,
    /// Multi-select collapse policy, see [`MultiValuePolicy`].
    pub policy: MultiValuePolicy,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            // Asia/Ho_Chi_Minh; no DST, safe as a fixed offset.
            tz: FixedOffset::east_opt(7 * 3600).expect("+07:00 is a valid offset"),
            policy: MultiValuePolicy::FirstOnly,
        }
    }
}

/// Map one remote record into the canonical mirror row.
#[must_use]
pub fn map_record(record: &RemoteRecord, options: &MapperOptions) -> CanonicalRow {
    let field = |aliases: &[&str]| first_present(record, aliases);
    let text = |aliases: &[&str]| field(aliases).and_then(|value| normalize_scalar(value, options.policy));

    let name = text(NAME_FIELDS);
    let group = text(GROUP_FIELDS);
    let doc_type = text(DOC_TYPE_FIELDS);
    let khu_vuc = text(KHU_VUC_FIELDS);

    let timestamp = normalize_timestamp(
        field(TIME_FIELDS),
        field(TIME_FALLBACK_FIELDS),
        options.tz,
    );

    CanonicalRow {
        record_id: record.record_id.clone(),
        description: text(DESCRIPTION_FIELDS),
        image: text(IMAGE_FIELDS),
        record_type: resolve_type(text(TYPE_FIELDS).as_deref()),
        time: timestamp.time,
        time_raw: timestamp.time_raw,
        is_pinned: field(PIN_FIELDS).is_some_and(is_truthy),
        latitude: parse_coordinate(field(LATITUDE_FIELDS), options.policy),
        longitude: parse_coordinate(field(LONGITUDE_FIELDS), options.policy),
        status: text(STATUS_FIELDS).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        email: text(EMAIL_FIELDS),
        lien_he: text(LIEN_HE_FIELDS),
        link_facebook: text(LINK_FACEBOOK_FIELDS),
        shadow_name: name.as_deref().map(normalize_search_text),
        shadow_group: group.as_deref().map(normalize_search_text),
        shadow_doc_type: doc_type.as_deref().map(normalize_search_text),
        shadow_khu_vuc: khu_vuc.as_deref().map(normalize_search_text),
        name,
        group,
        doc_type,
        khu_vuc,
    }
}

fn first_present<'a>(record: &'a RemoteRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| record.fields.get(*alias).filter(|value| !value.is_null()))
}

/// Resolve the free-text status label to the two-valued `type` column.
///
/// An absent field means the record predates the column and defaults to
/// the `"found"` literal; a present label is matched against the known
/// "found" phrases and falls back to `"lost"`.
fn resolve_type(label: Option<&str>) -> String {
    let Some(label) = label else {
        return DEFAULT_RECORD_TYPE.to_string();
    };
    let normalized = normalize_search_text(label);
    if FOUND_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
        "found".to_string()
    } else {
        "lost".to_string()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => {
            let lowered = text.trim().to_ascii_lowercase();
            !lowered.is_empty() && lowered != "false" && lowered != "0"
        }
        Value::Array(items) => items.first().is_some_and(is_truthy),
        _ => false,
    }
}

fn parse_coordinate(value: Option<&Value>, policy: MultiValuePolicy) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        other => normalize_scalar(other, policy)?.parse::<f64>().ok(),
    };
    parsed.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};

    fn record(fields: Value) -> RemoteRecord {
        let Value::Object(map) = fields else {
            panic!("fixture fields must be an object")
        };
        RemoteRecord::new("recXYZ", map)
    }

    #[test]
    fn map_record_is_total_on_empty_fields() {
        let row = map_record(&RemoteRecord::new("rec1", Map::new()), &MapperOptions::default());
        assert_eq!(row.record_id, "rec1");
        assert_eq!(row.name, None);
        assert_eq!(row.description, None);
        assert_eq!(row.record_type, "found");
        assert_eq!(row.status, "Chờ duyệt");
        assert!(!row.is_pinned);
        assert_eq!(row.latitude, None);
        assert_eq!(row.longitude, None);
        assert_eq!(row.time, None);
        assert_eq!(row.time_raw, None);
        assert_eq!(row.shadow_name, None);
    }

    #[test]
    fn map_record_resolves_field_aliases_in_order() {
        let row = map_record(
            &record(json!({"Title": "Fallback", "TieuDe": "Ưu tiên"})),
            &MapperOptions::default(),
        );
        assert_eq!(row.name.as_deref(), Some("Ưu tiên"));

        let row = map_record(&record(json!({"Title": "Fallback"})), &MapperOptions::default());
        assert_eq!(row.name.as_deref(), Some("Fallback"));
    }

    #[test]
    fn map_record_derives_shadow_columns() {
        let row = map_record(
            &record(json!({"Group": "Thẻ Sinh Viên", "TieuDe": "Đã Duyệt"})),
            &MapperOptions::default(),
        );
        assert_eq!(row.group.as_deref(), Some("Thẻ Sinh Viên"));
        assert_eq!(row.shadow_group.as_deref(), Some("the sinh vien"));
        assert_eq!(row.shadow_name.as_deref(), Some("da duyet"));
    }

    #[test]
    fn map_record_resolves_type_phrases_diacritic_insensitively() {
        let found = map_record(
            &record(json!({"LoaiTin": "Nhặt được ví"})),
            &MapperOptions::default(),
        );
        assert_eq!(found.record_type, "found");

        let lost = map_record(
            &record(json!({"LoaiTin": "Tìm đồ bị mất"})),
            &MapperOptions::default(),
        );
        assert_eq!(lost.record_type, "lost");

        let unmatched = map_record(
            &record(json!({"LoaiTin": "gì đó khác"})),
            &MapperOptions::default(),
        );
        assert_eq!(unmatched.record_type, "lost");
    }

    #[test]
    fn map_record_reads_pin_under_any_alias() {
        for fields in [json!({"Ghim": true}), json!({"Pinned": 1}), json!({"IsPinned": "true"})] {
            let row = map_record(&record(fields), &MapperOptions::default());
            assert!(row.is_pinned);
        }
        let row = map_record(&record(json!({"Ghim": false})), &MapperOptions::default());
        assert!(!row.is_pinned);
    }

    #[test]
    fn map_record_drops_nan_coordinates() {
        let row = map_record(
            &record(json!({"Latitude": "10.762", "Longitude": "not a number"})),
            &MapperOptions::default(),
        );
        assert_eq!(row.latitude, Some(10.762));
        assert_eq!(row.longitude, None);

        let nan = map_record(&record(json!({"Latitude": "NaN"})), &MapperOptions::default());
        assert_eq!(nan.latitude, None);
    }

    #[test]
    fn map_record_honors_multi_value_policy() {
        let fields = json!({"LoaiDo": ["Thẻ sinh viên", "Ví"]});

        let first = map_record(
            &record(fields.clone()),
            &MapperOptions {
                policy: MultiValuePolicy::FirstOnly,
                ..MapperOptions::default()
            },
        );
        assert_eq!(first.doc_type.as_deref(), Some("Thẻ sinh viên"));
        assert_eq!(first.shadow_doc_type.as_deref(), Some("the sinh vien"));

        let joined = map_record(
            &record(fields),
            &MapperOptions {
                policy: MultiValuePolicy::JoinComma,
                ..MapperOptions::default()
            },
        );
        assert_eq!(joined.doc_type.as_deref(), Some("Thẻ sinh viên, Ví"));
        assert_eq!(joined.shadow_doc_type.as_deref(), Some("the sinh vien, vi"));
    }

    #[test]
    fn map_record_renders_time_from_epoch_millis() {
        let row = map_record(
            &record(json!({"ThoiGian": 1_700_000_000_000_i64})),
            &MapperOptions::default(),
        );
        assert_eq!(row.time.as_deref(), Some("2023/11/15"));
        assert_eq!(row.time_raw, Some(1_700_000_000_000));
    }

    #[test]
    fn map_record_falls_back_to_created_time() {
        let row = map_record(
            &record(json!({"CreatedTime": 1_700_000_000_000_i64})),
            &MapperOptions::default(),
        );
        assert_eq!(row.time_raw, Some(1_700_000_000_000));
    }
}
