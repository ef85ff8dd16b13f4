use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{now_iso, Db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Ack, JsonBody, PathParam, QueryParams};
use crate::listing::{self, ListQuery, Listable, Listing, SortColumn, SortKey};
use crate::party::Address;
use crate::util::{lenient_bool, lenient_f64, lenient_string, parse_flag, trimmed};
use crate::validation::{sanitize_html_opt, sanitize_string, validate_contact};

pub const DEFAULT_PAYMENT_TERMS: &str = "net30";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Address,
    pub billing_address: Address,
    pub tax_id: Option<String>,
    pub payment_terms: String,
    pub credit_limit: Option<f64>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_terms: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub credit_limit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_active: Option<bool>,
}

/// A customer payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Address,
    pub billing_address: Address,
    pub tax_id: Option<String>,
    pub payment_terms: String,
    pub credit_limit: Option<f64>,
    pub notes: Option<String>,
    pub is_active: bool,
}

fn clean_address(address: Option<Address>) -> Address {
    let a = address.unwrap_or_default();
    Address {
        street: trimmed(a.street.as_deref()),
        city: trimmed(a.city.as_deref()),
        state: trimmed(a.state.as_deref()),
        zip_code: trimmed(a.zip_code.as_deref()),
        country: trimmed(a.country.as_deref()),
    }
}

impl CustomerInput {
    pub fn validate(self) -> ApiResult<NewCustomer> {
        let name = sanitize_string(self.name.as_deref(), Some(200), false);
        let email = sanitize_string(self.email.as_deref(), Some(254), false);
        let (Some(name), Some(email)) = (name, email) else {
            return Err(ApiError::bad_request("Name and email are required"));
        };
        let phone = trimmed(self.phone.as_deref());
        validate_contact(&email, phone.as_deref()).map_err(ApiError::BadRequest)?;

        Ok(NewCustomer {
            name,
            email,
            phone,
            company: sanitize_string(self.company.as_deref(), Some(200), false),
            address: clean_address(self.address),
            billing_address: clean_address(self.billing_address),
            tax_id: trimmed(self.tax_id.as_deref()),
            payment_terms: trimmed(self.payment_terms.as_deref())
                .unwrap_or_else(|| DEFAULT_PAYMENT_TERMS.to_string()),
            credit_limit: self.credit_limit,
            notes: sanitize_html_opt(sanitize_string(self.notes.as_deref(), Some(2000), false)),
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    #[serde(default)]
    pub active: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerColumn {
    Name,
    Email,
    Company,
    PaymentTerms,
    CreatedAt,
    Status,
}

impl SortColumn for CustomerColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "company" => Some(Self::Company),
            "paymentTerms" => Some(Self::PaymentTerms),
            "createdAt" => Some(Self::CreatedAt),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    fn default_column() -> Self {
        Self::Name
    }
}

impl Listable for Customer {
    type Column = CustomerColumn;

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.email.as_str(),
            self.company.as_deref().unwrap_or_default(),
            self.phone.as_deref().unwrap_or_default(),
        ]
    }

    fn sort_key(&self, column: CustomerColumn) -> SortKey {
        match column {
            CustomerColumn::Name => SortKey::text(Some(self.name.as_str())),
            CustomerColumn::Email => SortKey::text(Some(self.email.as_str())),
            CustomerColumn::Company => SortKey::text(self.company.as_deref()),
            CustomerColumn::PaymentTerms => SortKey::text(Some(self.payment_terms.as_str())),
            CustomerColumn::CreatedAt => SortKey::text(self.created_at.as_deref()),
            CustomerColumn::Status => SortKey::Flag(self.is_active),
        }
    }
}

const SELECT_CUSTOMER: &str = r#"SELECT id, name, email, phone, company,
       street, city, state, zip_code, country,
       billing_street, billing_city, billing_state, billing_zip_code, billing_country,
       tax_id, payment_terms, credit_limit, notes, is_active, created_at
  FROM customers"#;

fn customer_from_row(r: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        phone: r.get(3)?,
        company: r.get(4)?,
        address: Address {
            street: r.get(5)?,
            city: r.get(6)?,
            state: r.get(7)?,
            zip_code: r.get(8)?,
            country: r.get(9)?,
        },
        billing_address: Address {
            street: r.get(10)?,
            city: r.get(11)?,
            state: r.get(12)?,
            zip_code: r.get(13)?,
            country: r.get(14)?,
        },
        tax_id: r.get(15)?,
        payment_terms: r
            .get::<_, Option<String>>(16)?
            .unwrap_or_else(|| DEFAULT_PAYMENT_TERMS.to_string()),
        credit_limit: r.get(17)?,
        notes: r.get(18)?,
        is_active: r.get::<_, Option<bool>>(19)?.unwrap_or(true),
        created_at: r.get(20)?,
    })
}

pub fn read_all(conn: &Connection) -> Result<Vec<Customer>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("{SELECT_CUSTOMER} ORDER BY id"))?;
    let rows = stmt.query_map([], customer_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn read_one(conn: &Connection, id: i64) -> Result<Option<Customer>, rusqlite::Error> {
    conn.query_row(
        &format!("{SELECT_CUSTOMER} WHERE id = ?1"),
        params![id],
        customer_from_row,
    )
    .optional()
}

pub fn insert(conn: &Connection, c: &NewCustomer) -> Result<i64, rusqlite::Error> {
    conn.execute(
        r#"INSERT INTO customers (
               name, email, phone, company,
               street, city, state, zip_code, country,
               billing_street, billing_city, billing_state, billing_zip_code, billing_country,
               tax_id, payment_terms, credit_limit, notes, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"#,
        params![
            c.name,
            c.email,
            c.phone,
            c.company,
            c.address.street,
            c.address.city,
            c.address.state,
            c.address.zip_code,
            c.address.country,
            c.billing_address.street,
            c.billing_address.city,
            c.billing_address.state,
            c.billing_address.zip_code,
            c.billing_address.country,
            c.tax_id,
            c.payment_terms,
            c.credit_limit,
            c.notes,
            c.is_active,
            now_iso(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns `false` when no such customer exists.
pub fn update(conn: &Connection, id: i64, c: &NewCustomer) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        r#"UPDATE customers SET
               name = ?2, email = ?3, phone = ?4, company = ?5,
               street = ?6, city = ?7, state = ?8, zip_code = ?9, country = ?10,
               billing_street = ?11, billing_city = ?12, billing_state = ?13,
               billing_zip_code = ?14, billing_country = ?15,
               tax_id = ?16, payment_terms = ?17, credit_limit = ?18, notes = ?19, is_active = ?20
           WHERE id = ?1"#,
        params![
            id,
            c.name,
            c.email,
            c.phone,
            c.company,
            c.address.street,
            c.address.city,
            c.address.state,
            c.address.zip_code,
            c.address.country,
            c.billing_address.street,
            c.billing_address.city,
            c.billing_address.state,
            c.billing_address.zip_code,
            c.billing_address.country,
            c.tax_id,
            c.payment_terms,
            c.credit_limit,
            c.notes,
            c.is_active,
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete(conn: &Connection, id: i64) -> ApiResult<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM customers WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::NotFound("Customer not found"));
    }
    let invoices: i64 = conn.query_row(
        "SELECT COUNT(1) FROM invoices WHERE customer_id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    if invoices > 0 {
        return Err(ApiError::Conflict(
            "Customer has invoices and cannot be deleted".to_string(),
        ));
    }
    conn.execute("DELETE FROM customers WHERE id = ?1", params![id])?;
    Ok(())
}

fn filter_rows(rows: Vec<Customer>, filter: &CustomerFilter) -> ApiResult<Vec<Customer>> {
    let Some(raw) = trimmed(filter.active.as_deref()) else {
        return Ok(rows);
    };
    let active = parse_flag(&raw)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid active filter: {raw}")))?;
    Ok(rows.into_iter().filter(|c| c.is_active == active).collect())
}

pub async fn list_customers(
    State(db): State<Db>,
    QueryParams(query): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<CustomerFilter>,
) -> ApiResult<Listing<Customer>> {
    let rows = db.with_read("list_customers", |conn| Ok(read_all(conn)?)).await?;
    listing::apply(filter_rows(rows, &filter)?, &query)
}

pub async fn get_customer(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<Customer>> {
    db.with_read("get_customer", move |conn| {
        read_one(conn, id)?.ok_or(ApiError::NotFound("Customer not found"))
    })
    .await
    .map(Json)
}

pub async fn create_customer(
    State(db): State<Db>,
    JsonBody(input): JsonBody<CustomerInput>,
) -> ApiResult<(StatusCode, Json<Ack>)> {
    let customer = input.validate()?;
    let id = db
        .with_write("create_customer", move |conn| Ok(insert(conn, &customer)?))
        .await?;
    tracing::info!(id, "customer created");
    Ok((StatusCode::CREATED, Json(Ack::with_id(id))))
}

pub async fn update_customer(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<CustomerInput>,
) -> ApiResult<Json<Ack>> {
    db.with_write("update_customer", move |conn| {
        if read_one(conn, id)?.is_none() {
            return Err(ApiError::NotFound("Customer not found"));
        }
        let customer = input.validate()?;
        update(conn, id, &customer)?;
        Ok(())
    })
    .await?;
    Ok(Json(Ack::with_id(id)))
}

pub async fn delete_customer(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<Ack>> {
    db.with_write("delete_customer", move |conn| delete(conn, id)).await?;
    tracing::info!(id, "customer deleted");
    Ok(Json(Ack::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::prepare_connection;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        prepare_connection(&conn).unwrap();
        conn
    }

    fn input(name: &str, email: &str) -> CustomerInput {
        CustomerInput {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn name_and_email_are_required() {
        let err = input("  ", "a@b.io").validate().unwrap_err();
        assert_eq!(err.to_string(), "Name and email are required");
        let err = input("Acme", "").validate().unwrap_err();
        assert_eq!(err.to_string(), "Name and email are required");
    }

    #[test]
    fn email_and_phone_are_checked() {
        let err = input("Acme", "acme-at-example").validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid email address");

        let mut bad_phone = input("Acme", "ops@acme.io");
        bad_phone.phone = Some("12-34".into());
        assert_eq!(bad_phone.validate().unwrap_err().to_string(), "Invalid phone number");
    }

    #[test]
    fn defaults_and_cleanup() {
        let payload: CustomerInput = serde_json::from_value(serde_json::json!({
            "name": " Globex ",
            "email": "billing@globex.com",
            "creditLimit": "2500",
            "notes": "<script>x</script>Pays late",
            "address": {"city": " Springfield ", "zipCode": ""}
        }))
        .unwrap();
        let c = payload.validate().unwrap();
        assert_eq!(c.name, "Globex");
        assert_eq!(c.payment_terms, "net30");
        assert_eq!(c.credit_limit, Some(2500.0));
        assert_eq!(c.notes.as_deref(), Some("xPays late"));
        assert_eq!(c.address.city.as_deref(), Some("Springfield"));
        assert_eq!(c.address.zip_code, None);
        assert!(c.is_active);
    }

    #[test]
    fn insert_read_update() {
        let conn = conn();
        let id = insert(&conn, &input("Acme", "a@acme.io").validate().unwrap()).unwrap();
        let mut changed = input("Acme Corp", "a@acme.io");
        changed.is_active = Some(false);
        assert!(update(&conn, id, &changed.validate().unwrap()).unwrap());
        let c = read_one(&conn, id).unwrap().unwrap();
        assert_eq!(c.name, "Acme Corp");
        assert!(!c.is_active);
        assert!(c.created_at.is_some());
        assert!(!update(&conn, id + 100, &input("X", "x@x.io").validate().unwrap()).unwrap());
    }

    #[test]
    fn delete_refuses_customers_with_invoices() {
        let conn = conn();
        let id = insert(&conn, &input("Acme", "a@acme.io").validate().unwrap()).unwrap();
        conn.execute(
            "INSERT INTO invoices (invoice_number, customer_id) VALUES ('INV-1', ?1)",
            params![id],
        )
        .unwrap();
        assert!(matches!(delete(&conn, id), Err(ApiError::Conflict(_))));
        assert!(matches!(delete(&conn, 999), Err(ApiError::NotFound(_))));

        conn.execute("DELETE FROM invoices", []).unwrap();
        delete(&conn, id).unwrap();
        assert!(read_one(&conn, id).unwrap().is_none());
    }

    #[test]
    fn active_filter() {
        let conn = conn();
        insert(&conn, &input("On", "on@x.io").validate().unwrap()).unwrap();
        let mut off = input("Off", "off@x.io");
        off.is_active = Some(false);
        insert(&conn, &off.validate().unwrap()).unwrap();

        let rows = read_all(&conn).unwrap();
        let filter = CustomerFilter { active: Some("false".into()) };
        let only = filter_rows(rows.clone(), &filter).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].name, "Off");

        let bad = CustomerFilter { active: Some("sometimes".into()) };
        assert!(filter_rows(rows, &bad).is_err());
    }
}
