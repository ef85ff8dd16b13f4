//! Shapes shared by customers and vendors, and the compact party summary
//! embedded in expenses and payments.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::util::{lenient_string, trimmed};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, deserialize_with = "lenient_string")]
    pub street: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zip_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
}

impl Address {
    pub fn is_blank(&self) -> bool {
        [&self.street, &self.city, &self.state, &self.zip_code, &self.country]
            .iter()
            .all(|part| part.as_deref().map(str::trim).unwrap_or_default().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyKind {
    Vendor,
    Customer,
}

/// Name/email view of the vendor or customer a record is linked to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub id: i64,
    pub name: String,
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub email: Option<String>,
}

impl PartySummary {
    pub fn vendor(id: i64, company: Option<String>, contact: Option<String>, email: Option<String>) -> Self {
        let name = trimmed(company.as_deref())
            .or_else(|| trimmed(contact.as_deref()))
            .unwrap_or_else(|| "Unnamed Vendor".to_string());
        Self {
            id,
            name,
            company,
            contact: Some(contact.unwrap_or_default()),
            email: trimmed(email.as_deref()),
        }
    }

    pub fn customer(id: i64, name: Option<String>, company: Option<String>, email: Option<String>) -> Self {
        let display = trimmed(name.as_deref())
            .or_else(|| trimmed(company.as_deref()))
            .unwrap_or_else(|| "Unnamed Customer".to_string());
        Self {
            id,
            name: display,
            company,
            contact: None,
            email: trimmed(email.as_deref()),
        }
    }
}

/// Rejects references to vendors/customers that do not exist.
pub fn ensure_party_exists(conn: &Connection, kind: PartyKind, id: Option<i64>) -> ApiResult<()> {
    let Some(id) = id else { return Ok(()) };
    let (table, message) = match kind {
        PartyKind::Vendor => ("vendors", "Vendor not found"),
        PartyKind::Customer => ("customers", "Customer not found"),
    };
    let found: i64 = conn.query_row(
        &format!("SELECT COUNT(1) FROM {table} WHERE id = ?1"),
        params![id],
        |r| r.get(0),
    )?;
    if found == 0 {
        return Err(ApiError::bad_request(message));
    }
    Ok(())
}
