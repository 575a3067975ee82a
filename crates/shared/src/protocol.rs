use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{Barcode, NewRecord, QuantityUpdate, Record, RecordId};

pub const FIELD_BARCODE: &str = "Barcode";
pub const FIELD_NAME: &str = "Product Name";
pub const FIELD_QUANTITY: &str = "Quantity";
pub const FIELD_COLOR: &str = "Color";
pub const FIELD_SIZE: &str = "Size";
pub const FIELD_LAST_UPDATED: &str = "Last Updated";

pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown Product";

/// Column set of an inventory row. Every column is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    #[serde(rename = "Barcode", default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(rename = "Product Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "Quantity",
        default,
        deserialize_with = "lenient_quantity",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<i64>,
    #[serde(rename = "Color", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(rename = "Last Updated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Accepts integers, decimals (truncated) and numeric strings with a
/// leading integer. Anything else reads as absent.
fn lenient_quantity<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(quantity_from_value))
}

fn quantity_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|quantity| quantity.is_finite())
                .map(|quantity| quantity.trunc() as i64)
        }),
        Value::String(raw) => {
            let raw = raw.trim();
            let sign_len = usize::from(raw.starts_with(['-', '+']));
            let digits = raw[sign_len..]
                .find(|c: char| !c.is_ascii_digit())
                .map_or(raw.len(), |end| end + sign_len);
            raw[..digits].parse().ok()
        }
        _ => None,
    }
}

impl From<&NewRecord> for RecordFields {
    fn from(value: &NewRecord) -> Self {
        Self {
            barcode: Some(value.barcode.0.clone()),
            name: Some(value.details.name.clone()),
            quantity: Some(i64::from(value.quantity)),
            color: Some(value.details.color.clone()),
            size: Some(value.details.size.clone()),
            last_updated: Some(format_timestamp(value.last_updated)),
        }
    }
}

impl From<&QuantityUpdate> for RecordFields {
    fn from(value: &QuantityUpdate) -> Self {
        Self {
            quantity: Some(i64::from(value.quantity)),
            last_updated: Some(format_timestamp(value.last_updated)),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(default)]
    pub fields: RecordFields,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl StoredRecord {
    /// Converts the wire row into a [`Record`], filling absent columns with defaults.
    /// `fallback_barcode` is used when the row has no barcode column.
    pub fn into_record(self, fallback_barcode: Option<&Barcode>) -> Record {
        let fields = self.fields;
        let barcode = fields
            .barcode
            .as_deref()
            .and_then(Barcode::parse)
            .or_else(|| fallback_barcode.cloned())
            .unwrap_or_else(|| Barcode(String::new()));
        Record {
            id: RecordId(self.id),
            barcode,
            name: fields
                .name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string()),
            quantity: fields
                .quantity
                .map(|quantity| u32::try_from(quantity.max(0)).unwrap_or(u32::MAX))
                .unwrap_or(0),
            color: fields.color.unwrap_or_default(),
            size: fields.size.unwrap_or_default(),
            last_updated: fields.last_updated.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRecordsResponse {
    pub records: Vec<StoredRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRecordRequest {
    pub fields: RecordFields,
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Airtable formula matching rows whose barcode column equals `barcode`.
pub fn barcode_filter_formula(barcode: &Barcode) -> String {
    let escaped = barcode.0.replace('\\', "\\\\").replace('\'', "\\'");
    format!("({{{FIELD_BARCODE}}}='{escaped}')")
}
