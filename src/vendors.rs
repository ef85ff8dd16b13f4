use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::customers::DEFAULT_PAYMENT_TERMS;
use crate::db::{now_iso, Db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Ack, JsonBody, PathParam, QueryParams};
use crate::listing::{self, ListQuery, Listable, Listing, SortColumn, SortKey};
use crate::party::Address;
use crate::util::{lenient_bool, lenient_string, trimmed};
use crate::validation::{sanitize_html_opt, sanitize_string, validate_contact};

pub const DEFAULT_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: i64,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// `None` when every part of the address is empty.
    pub address: Option<Address>,
    pub tax_id: Option<String>,
    pub payment_terms: String,
    pub category: String,
    pub account_number: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
}

impl Vendor {
    fn display_name(&self) -> &str {
        self.company
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.contact.as_deref())
            .unwrap_or_default()
    }
}

/// Vendor payload. Older clients send `name` for the company and
/// `contactName` for the contact person.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_terms: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub account_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVendor {
    pub company: String,
    pub contact: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Address,
    pub tax_id: Option<String>,
    pub payment_terms: String,
    pub category: String,
    pub account_number: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
}

impl VendorInput {
    pub fn validate(self) -> ApiResult<NewVendor> {
        let company = sanitize_string(self.company.as_deref(), Some(200), false)
            .or_else(|| sanitize_string(self.name.as_deref(), Some(200), false));
        let email = sanitize_string(self.email.as_deref(), Some(254), false);
        let (Some(company), Some(email)) = (company, email) else {
            return Err(ApiError::bad_request("Company and email are required"));
        };
        let phone = trimmed(self.phone.as_deref());
        validate_contact(&email, phone.as_deref()).map_err(ApiError::BadRequest)?;

        let address = self.address.unwrap_or_default();
        Ok(NewVendor {
            company,
            contact: sanitize_string(self.contact.as_deref(), Some(200), false)
                .or_else(|| sanitize_string(self.contact_name.as_deref(), Some(200), false)),
            email,
            phone,
            address: Address {
                street: trimmed(address.street.as_deref()),
                city: trimmed(address.city.as_deref()),
                state: trimmed(address.state.as_deref()),
                zip_code: trimmed(address.zip_code.as_deref()),
                country: trimmed(address.country.as_deref()),
            },
            tax_id: trimmed(self.tax_id.as_deref()),
            payment_terms: trimmed(self.payment_terms.as_deref())
                .unwrap_or_else(|| DEFAULT_PAYMENT_TERMS.to_string()),
            category: trimmed(self.category.as_deref())
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            account_number: trimmed(self.account_number.as_deref()),
            notes: sanitize_html_opt(sanitize_string(self.notes.as_deref(), Some(2000), false)),
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorFilter {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorColumn {
    Company,
    Contact,
    Category,
    PaymentTerms,
    Status,
}

impl SortColumn for VendorColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "company" => Some(Self::Company),
            "contact" => Some(Self::Contact),
            "category" => Some(Self::Category),
            "paymentTerms" => Some(Self::PaymentTerms),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    fn default_column() -> Self {
        Self::Company
    }
}

impl Listable for Vendor {
    type Column = VendorColumn;

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.company.as_deref().unwrap_or_default(),
            self.contact.as_deref().unwrap_or_default(),
            self.email.as_deref().unwrap_or_default(),
            self.phone.as_deref().unwrap_or_default(),
        ]
    }

    fn sort_key(&self, column: VendorColumn) -> SortKey {
        match column {
            VendorColumn::Company => SortKey::text(Some(self.display_name())),
            // the contact column of the vendor table shows the email
            VendorColumn::Contact => SortKey::text(self.email.as_deref()),
            VendorColumn::Category => SortKey::text(Some(self.category.as_str())),
            VendorColumn::PaymentTerms => SortKey::text(Some(self.payment_terms.as_str())),
            VendorColumn::Status => SortKey::Flag(self.is_active),
        }
    }
}

const SELECT_VENDOR: &str = r#"SELECT id, company, name, email, phone,
       street, city, state, zip_code, country,
       tax_id, payment_terms, category, account_number, notes, is_active, created_at
  FROM vendors"#;

fn vendor_from_row(r: &Row<'_>) -> rusqlite::Result<Vendor> {
    let address = Address {
        street: r.get(5)?,
        city: r.get(6)?,
        state: r.get(7)?,
        zip_code: r.get(8)?,
        country: r.get(9)?,
    };
    Ok(Vendor {
        id: r.get(0)?,
        company: r.get(1)?,
        contact: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        address: (!address.is_blank()).then_some(address),
        tax_id: r.get(10)?,
        payment_terms: r
            .get::<_, Option<String>>(11)?
            .unwrap_or_else(|| DEFAULT_PAYMENT_TERMS.to_string()),
        category: r
            .get::<_, Option<String>>(12)?
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        account_number: r.get(13)?,
        notes: r.get(14)?,
        is_active: r.get::<_, Option<bool>>(15)?.unwrap_or(true),
        created_at: r.get(16)?,
    })
}

pub fn read_all(conn: &Connection) -> Result<Vec<Vendor>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("{SELECT_VENDOR} ORDER BY id"))?;
    let rows = stmt.query_map([], vendor_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn read_one(conn: &Connection, id: i64) -> Result<Option<Vendor>, rusqlite::Error> {
    conn.query_row(&format!("{SELECT_VENDOR} WHERE id = ?1"), params![id], vendor_from_row)
        .optional()
}

pub fn insert(conn: &Connection, v: &NewVendor) -> Result<i64, rusqlite::Error> {
    conn.execute(
        r#"INSERT INTO vendors (
               company, name, email, phone, street, city, state, zip_code, country,
               tax_id, payment_terms, category, account_number, notes, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"#,
        params![
            v.company,
            v.contact,
            v.email,
            v.phone,
            v.address.street,
            v.address.city,
            v.address.state,
            v.address.zip_code,
            v.address.country,
            v.tax_id,
            v.payment_terms,
            v.category,
            v.account_number,
            v.notes,
            v.is_active,
            now_iso(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update(conn: &Connection, id: i64, v: &NewVendor) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        r#"UPDATE vendors SET
               company = ?2, name = ?3, email = ?4, phone = ?5,
               street = ?6, city = ?7, state = ?8, zip_code = ?9, country = ?10,
               tax_id = ?11, payment_terms = ?12, category = ?13, account_number = ?14,
               notes = ?15, is_active = ?16
           WHERE id = ?1"#,
        params![
            id,
            v.company,
            v.contact,
            v.email,
            v.phone,
            v.address.street,
            v.address.city,
            v.address.state,
            v.address.zip_code,
            v.address.country,
            v.tax_id,
            v.payment_terms,
            v.category,
            v.account_number,
            v.notes,
            v.is_active,
        ],
    )?;
    Ok(changed > 0)
}

/// Expenses and payments keep their rows; the foreign keys null the link.
pub fn delete(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM vendors WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

fn filter_rows(rows: Vec<Vendor>, filter: &VendorFilter) -> Vec<Vendor> {
    match trimmed(filter.category.as_deref()) {
        None => rows,
        Some(category) => rows
            .into_iter()
            .filter(|v| v.category.eq_ignore_ascii_case(&category))
            .collect(),
    }
}

pub async fn list_vendors(
    State(db): State<Db>,
    QueryParams(query): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<VendorFilter>,
) -> ApiResult<Listing<Vendor>> {
    let rows = db.with_read("list_vendors", |conn| Ok(read_all(conn)?)).await?;
    listing::apply(filter_rows(rows, &filter), &query)
}

pub async fn get_vendor(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Vendor>> {
    db.with_read("get_vendor", move |conn| {
        read_one(conn, id)?.ok_or(ApiError::NotFound("Vendor not found"))
    })
    .await
    .map(Json)
}

pub async fn create_vendor(
    State(db): State<Db>,
    JsonBody(input): JsonBody<VendorInput>,
) -> ApiResult<(StatusCode, Json<Ack>)> {
    let vendor = input.validate()?;
    let id = db.with_write("create_vendor", move |conn| Ok(insert(conn, &vendor)?)).await?;
    tracing::info!(id, "vendor created");
    Ok((StatusCode::CREATED, Json(Ack::with_id(id))))
}

pub async fn update_vendor(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<VendorInput>,
) -> ApiResult<Json<Ack>> {
    db.with_write("update_vendor", move |conn| {
        if read_one(conn, id)?.is_none() {
            return Err(ApiError::NotFound("Vendor not found"));
        }
        let vendor = input.validate()?;
        update(conn, id, &vendor)?;
        Ok(())
    })
    .await?;
    Ok(Json(Ack::with_id(id)))
}

pub async fn delete_vendor(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Ack>> {
    let deleted = db.with_write("delete_vendor", move |conn| Ok(delete(conn, id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Vendor not found"));
    }
    tracing::info!(id, "vendor deleted");
    Ok(Json(Ack::ok()))
}
