//! The single company profile row.

use axum::extract::State;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Ack, JsonBody};
use crate::util::{lenient_string, trimmed};
use crate::validation::{sanitize_string, validate_email, validate_phone};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    #[serde(default, deserialize_with = "lenient_string")]
    pub address1: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address2: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub postal_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
}

impl PostalAddress {
    fn cleaned(self) -> Self {
        Self {
            address1: trimmed(self.address1.as_deref()),
            address2: trimmed(self.address2.as_deref()),
            city: trimmed(self.city.as_deref()),
            state: trimmed(self.state.as_deref()),
            postal_code: trimmed(self.postal_code.as_deref()),
            country: trimmed(self.country.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub contact_email: Option<String>,
    pub company_phone: Option<String>,
    pub mailing: PostalAddress,
    pub physical: PostalAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_phone: Option<String>,
    #[serde(default)]
    pub mailing: Option<PostalAddress>,
    #[serde(default)]
    pub physical: Option<PostalAddress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyProfile {
    pub name: String,
    pub contact_email: Option<String>,
    pub company_phone: Option<String>,
    pub mailing: PostalAddress,
    pub physical: PostalAddress,
}

impl CompanyInput {
    pub fn validate(self) -> ApiResult<CompanyProfile> {
        let name = sanitize_string(self.company_name.as_deref(), Some(200), false)
            .or_else(|| sanitize_string(self.name.as_deref(), Some(200), false))
            .ok_or_else(|| ApiError::bad_request("Company name is required"))?;
        let contact_email = trimmed(self.contact_email.as_deref());
        if let Some(email) = contact_email.as_deref() {
            if !validate_email(email) {
                return Err(ApiError::bad_request("Invalid email address"));
            }
        }
        let company_phone = trimmed(self.company_phone.as_deref());
        if !validate_phone(company_phone.as_deref().unwrap_or_default()) {
            return Err(ApiError::bad_request("Invalid phone number"));
        }
        Ok(CompanyProfile {
            name,
            contact_email,
            company_phone,
            mailing: self.mailing.unwrap_or_default().cleaned(),
            physical: self.physical.unwrap_or_default().cleaned(),
        })
    }
}

fn company_from_row(r: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: r.get(0)?,
        name: r.get(1)?,
        contact_email: r.get(2)?,
        company_phone: r.get(3)?,
        mailing: PostalAddress {
            address1: r.get(4)?,
            address2: r.get(5)?,
            city: r.get(6)?,
            state: r.get(7)?,
            postal_code: r.get(8)?,
            country: r.get(9)?,
        },
        physical: PostalAddress {
            address1: r.get(10)?,
            address2: r.get(11)?,
            city: r.get(12)?,
            state: r.get(13)?,
            postal_code: r.get(14)?,
            country: r.get(15)?,
        },
    })
}

pub fn read(conn: &Connection) -> Result<Option<Company>, rusqlite::Error> {
    conn.query_row(
        r#"SELECT id, name, contact_email, company_phone,
                  mailing_address1, mailing_address2, mailing_city, mailing_state,
                  mailing_postal_code, mailing_country,
                  physical_address1, physical_address2, physical_city, physical_state,
                  physical_postal_code, physical_country
             FROM companies ORDER BY id LIMIT 1"#,
        [],
        company_from_row,
    )
    .optional()
}

/// Updates the existing row or creates the first one.
pub fn upsert(conn: &Connection, c: &CompanyProfile) -> Result<i64, rusqlite::Error> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM companies ORDER BY id LIMIT 1", [], |r| r.get(0))
        .optional()?;
    let id = match existing {
        Some(id) => id,
        None => {
            conn.execute("INSERT INTO companies (name) VALUES (?1)", params![c.name])?;
            conn.last_insert_rowid()
        }
    };
    conn.execute(
        r#"UPDATE companies SET
               name = ?2, contact_email = ?3, company_phone = ?4,
               mailing_address1 = ?5, mailing_address2 = ?6, mailing_city = ?7,
               mailing_state = ?8, mailing_postal_code = ?9, mailing_country = ?10,
               physical_address1 = ?11, physical_address2 = ?12, physical_city = ?13,
               physical_state = ?14, physical_postal_code = ?15, physical_country = ?16
           WHERE id = ?1"#,
        params![
            id,
            c.name,
            c.contact_email,
            c.company_phone,
            c.mailing.address1,
            c.mailing.address2,
            c.mailing.city,
            c.mailing.state,
            c.mailing.postal_code,
            c.mailing.country,
            c.physical.address1,
            c.physical.address2,
            c.physical.city,
            c.physical.state,
            c.physical.postal_code,
            c.physical.country,
        ],
    )?;
    Ok(id)
}

pub async fn get_company(State(db): State<Db>) -> ApiResult<Json<Option<Company>>> {
    db.with_read("get_company", |conn| Ok(read(conn)?)).await.map(Json)
}

pub async fn save_company(
    State(db): State<Db>,
    JsonBody(input): JsonBody<CompanyInput>,
) -> ApiResult<Json<Ack>> {
    let profile = input.validate()?;
    let id = db.with_write("save_company", move |conn| Ok(upsert(conn, &profile)?)).await?;
    tracing::info!(id, "company profile saved");
    Ok(Json(Ack::with_id(id)))
}
