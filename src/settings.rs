//! Tax and notification settings. Each is a single upserted row.

use axum::extract::State;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Ack, JsonBody};
use crate::util::{lenient_bool, lenient_f64, lenient_string, null_as_empty, trimmed};
use crate::validation::{validate_email, validate_phone};

pub const MAX_TAX_RATES: usize = 5;
pub const DEFAULT_ENTITY_TYPE: &str = "llc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRate {
    pub name: String,
    pub rate: f64,
    pub compound: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxOrg {
    #[serde(default, deserialize_with = "lenient_string")]
    pub entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSettings {
    pub org: TaxOrg,
    pub default_tax_rate: f64,
    pub rates: Vec<TaxRate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRateInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub compound: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSettingsInput {
    #[serde(default)]
    pub org: Option<TaxOrg>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub default_tax_rate: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rates: Vec<TaxRateInput>,
}

impl TaxSettingsInput {
    pub fn normalize(self) -> TaxSettings {
        let org = self.org.unwrap_or_default();
        TaxSettings {
            org: TaxOrg {
                entity_type: Some(
                    trimmed(org.entity_type.as_deref())
                        .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
                ),
                tax_id: trimmed(org.tax_id.as_deref()),
                country: trimmed(org.country.as_deref()),
                region: trimmed(org.region.as_deref()),
            },
            default_tax_rate: self.default_tax_rate.unwrap_or(0.0),
            rates: self
                .rates
                .into_iter()
                .take(MAX_TAX_RATES)
                .map(|r| TaxRate {
                    name: trimmed(r.name.as_deref()).unwrap_or_default(),
                    rate: r.rate.unwrap_or(0.0),
                    compound: r.compound.unwrap_or(false),
                })
                .collect(),
        }
    }
}

pub fn read_tax(conn: &Connection) -> ApiResult<Option<TaxSettings>> {
    let row = conn
        .query_row(
            "SELECT entity_type, tax_id, country, region, default_tax_rate, rates_json FROM tax_settings ORDER BY id LIMIT 1",
            [],
            |r| {
                Ok((
                    TaxOrg {
                        entity_type: r.get(0)?,
                        tax_id: r.get(1)?,
                        country: r.get(2)?,
                        region: r.get(3)?,
                    },
                    r.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    r.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((org, default_tax_rate, rates_json)) = row else {
        return Ok(None);
    };
    let rates: Vec<TaxRate> = match rates_json.as_deref() {
        Some(json) if !json.trim().is_empty() => serde_json::from_str(json)?,
        _ => Vec::new(),
    };
    Ok(Some(TaxSettings {
        org,
        default_tax_rate,
        rates: rates.into_iter().filter(|r| !r.name.is_empty()).collect(),
    }))
}

pub fn upsert_tax(conn: &Connection, s: &TaxSettings) -> ApiResult<i64> {
    let rates_json = serde_json::to_string(&s.rates)?;
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM tax_settings ORDER BY id LIMIT 1", [], |r| r.get(0))
        .optional()?;
    let id = match existing {
        Some(id) => id,
        None => {
            conn.execute("INSERT INTO tax_settings DEFAULT VALUES", [])?;
            conn.last_insert_rowid()
        }
    };
    conn.execute(
        r#"UPDATE tax_settings
              SET entity_type = ?2, tax_id = ?3, country = ?4, region = ?5,
                  default_tax_rate = ?6, rates_json = ?7
            WHERE id = ?1"#,
        params![
            id,
            s.org.entity_type.as_deref().unwrap_or(DEFAULT_ENTITY_TYPE),
            s.org.tax_id,
            s.org.country,
            s.org.region,
            s.default_tax_rate,
            rates_json,
        ],
    )?;
    Ok(id)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default, deserialize_with = "lenient_bool_or_false")]
    pub enable_email: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool_or_false")]
    pub enable_sms: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
}

fn lenient_bool_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient_bool(deserializer)?.unwrap_or(false))
}

impl NotificationSettings {
    pub fn validate(self) -> ApiResult<Self> {
        let email_address = trimmed(self.email_address.as_deref());
        let phone_number = trimmed(self.phone_number.as_deref());
        if let Some(email) = email_address.as_deref() {
            if !validate_email(email) {
                return Err(ApiError::bad_request("Invalid email address"));
            }
        }
        if !validate_phone(phone_number.as_deref().unwrap_or_default()) {
            return Err(ApiError::bad_request("Invalid phone number"));
        }
        Ok(Self {
            email_address,
            phone_number,
            ..self
        })
    }
}

pub fn read_notifications(conn: &Connection) -> Result<Option<NotificationSettings>, rusqlite::Error> {
    conn.query_row(
        "SELECT enable_email, email_address, enable_sms, phone_number FROM notification_settings ORDER BY id LIMIT 1",
        [],
        |r| {
            Ok(NotificationSettings {
                enable_email: r.get::<_, Option<bool>>(0)?.unwrap_or(false),
                email_address: r.get(1)?,
                enable_sms: r.get::<_, Option<bool>>(2)?.unwrap_or(false),
                phone_number: r.get(3)?,
            })
        },
    )
    .optional()
}

pub fn upsert_notifications(conn: &Connection, s: &NotificationSettings) -> Result<i64, rusqlite::Error> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM notification_settings ORDER BY id LIMIT 1", [], |r| r.get(0))
        .optional()?;
    let id = match existing {
        Some(id) => id,
        None => {
            conn.execute("INSERT INTO notification_settings DEFAULT VALUES", [])?;
            conn.last_insert_rowid()
        }
    };
    conn.execute(
        r#"UPDATE notification_settings
              SET enable_email = ?2, email_address = ?3, enable_sms = ?4, phone_number = ?5
            WHERE id = ?1"#,
        params![id, s.enable_email, s.email_address, s.enable_sms, s.phone_number],
    )?;
    Ok(id)
}

pub async fn get_tax_settings(State(db): State<Db>) -> ApiResult<Json<Option<TaxSettings>>> {
    db.with_read("get_tax_settings", read_tax).await.map(Json)
}

pub async fn save_tax_settings(
    State(db): State<Db>,
    JsonBody(input): JsonBody<TaxSettingsInput>,
) -> ApiResult<Json<Ack>> {
    let settings = input.normalize();
    let id = db.with_write("save_tax_settings", move |conn| upsert_tax(conn, &settings)).await?;
    Ok(Json(Ack::with_id(id)))
}

pub async fn get_notification_settings(
    State(db): State<Db>,
) -> ApiResult<Json<Option<NotificationSettings>>> {
    db.with_read("get_notification_settings", |conn| Ok(read_notifications(conn)?))
        .await
        .map(Json)
}

pub async fn save_notification_settings(
    State(db): State<Db>,
    JsonBody(input): JsonBody<NotificationSettings>,
) -> ApiResult<Json<Ack>> {
    let settings = input.validate()?;
    let id = db
        .with_write("save_notification_settings", move |conn| Ok(upsert_notifications(conn, &settings)?))
        .await?;
    Ok(Json(Ack::with_id(id)))
}
