use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::db::{now_iso, Db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Ack, JsonBody, PathParam, QueryParams};
use crate::listing::{self, ListQuery, Listable, Listing, SortColumn, SortDirection, SortKey};
use crate::party::{ensure_party_exists, PartyKind, PartySummary};
use crate::util::{normalize_status, parse_id, parse_iso_date, round2, text_value, trimmed};
use crate::validation::{require_object, sanitize_html, validate_positive_float, validate_required_fields};

/// The invoice a payment settles, as shown next to the payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInvoice {
    pub id: i64,
    pub invoice_number: String,
    pub status: String,
    pub total: f64,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub amount: f64,
    pub date: String,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub invoice_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub invoice: Option<LinkedInvoice>,
    pub vendor: Option<PartySummary>,
    pub customer: Option<PartySummary>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentDraft {
    pub amount: f64,
    pub date: String,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub invoice_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub customer_id: Option<i64>,
}

impl From<Payment> for PaymentDraft {
    fn from(p: Payment) -> Self {
        Self {
            amount: p.amount,
            date: p.date,
            payment_method: p.payment_method,
            reference_number: p.reference_number,
            notes: p.notes,
            invoice_id: p.invoice_id,
            vendor_id: p.vendor_id,
            customer_id: p.customer_id,
        }
    }
}

impl PaymentDraft {
    pub fn apply(&mut self, patch: &Map<String, Value>) -> ApiResult<()> {
        if let Some(v) = patch.get("amount") {
            self.amount = validate_positive_float(v, "Amount").map_err(ApiError::BadRequest)?;
        }
        if let Some(v) = patch.get("date") {
            self.date = text_value(v).unwrap_or_default();
        }
        if let Some(v) = patch.get("paymentMethod") {
            self.payment_method = text_value(v);
        }
        if let Some(v) = patch.get("referenceNumber") {
            self.reference_number = text_value(v);
        }
        if let Some(v) = patch.get("notes") {
            self.notes = text_value(v).map(|n| sanitize_html(&n));
        }
        if let Some(v) = patch.get("invoiceId") {
            self.invoice_id = parse_id(v);
        }
        if let Some(v) = patch.get("vendorId") {
            self.vendor_id = parse_id(v);
        }
        if let Some(v) = patch.get("customerId") {
            self.customer_id = parse_id(v);
        }
        Ok(())
    }

    pub fn for_create(body: &Map<String, Value>) -> ApiResult<Self> {
        if !body.contains_key("amount") || !body.contains_key("date") {
            return Err(ApiError::bad_request("Amount and date are required"));
        }
        validate_required_fields(body, &["amount"])
            .map_err(|_| ApiError::bad_request("Amount and date are required"))?;
        let mut draft = Self::default();
        draft.apply(body)?;
        Ok(draft)
    }

    fn check(&self, conn: &Connection) -> ApiResult<()> {
        if self.date.is_empty() {
            return Err(ApiError::bad_request("Payment date is required"));
        }
        if let Some(invoice_id) = self.invoice_id {
            let found: i64 = conn.query_row(
                "SELECT COUNT(1) FROM invoices WHERE id = ?1",
                params![invoice_id],
                |r| r.get(0),
            )?;
            if found == 0 {
                return Err(ApiError::bad_request("Invoice not found"));
            }
        }
        ensure_party_exists(conn, PartyKind::Vendor, self.vendor_id)?;
        ensure_party_exists(conn, PartyKind::Customer, self.customer_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentColumn {
    Date,
    Amount,
}

impl SortColumn for PaymentColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "date" => Some(Self::Date),
            "amount" => Some(Self::Amount),
            _ => None,
        }
    }

    fn default_column() -> Self {
        Self::Date
    }

    fn default_direction(self) -> SortDirection {
        match self {
            Self::Date => SortDirection::Desc,
            Self::Amount => SortDirection::Asc,
        }
    }
}

impl Payment {
    fn party(&self) -> Option<&PartySummary> {
        self.vendor.as_ref().or(self.customer.as_ref())
    }
}

impl Listable for Payment {
    type Column = PaymentColumn;

    fn search_fields(&self) -> Vec<&str> {
        let invoice = self.invoice.as_ref();
        vec![
            self.party().map(|p| p.name.as_str()).unwrap_or_default(),
            self.party().and_then(|p| p.email.as_deref()).unwrap_or_default(),
            invoice.map(|i| i.invoice_number.as_str()).unwrap_or_default(),
            invoice.map(|i| i.status.as_str()).unwrap_or_default(),
            self.reference_number.as_deref().unwrap_or_default(),
            self.notes.as_deref().unwrap_or_default(),
            self.payment_method.as_deref().unwrap_or_default(),
        ]
    }

    fn sort_key(&self, column: PaymentColumn) -> SortKey {
        match column {
            PaymentColumn::Date => SortKey::Date(parse_iso_date(Some(self.date.as_str()))),
            PaymentColumn::Amount => SortKey::Number(self.amount),
        }
    }
}

const SELECT_PAYMENT: &str = r#"SELECT p.id, p.amount, p.date, p.payment_method, p.reference_number, p.notes,
       p.invoice_id, p.vendor_id, p.customer_id, p.created_at, p.updated_at,
       i.invoice_number, i.status, i.total, ic.name,
       v.company, v.name, v.email,
       c.name, c.company, c.email
  FROM payments p
  LEFT JOIN invoices i ON i.id = p.invoice_id
  LEFT JOIN customers ic ON ic.id = i.customer_id
  LEFT JOIN vendors v ON v.id = p.vendor_id
  LEFT JOIN customers c ON c.id = p.customer_id"#;

fn payment_from_row(r: &Row<'_>) -> rusqlite::Result<Payment> {
    let invoice_id: Option<i64> = r.get(6)?;
    let vendor_id: Option<i64> = r.get(7)?;
    let customer_id: Option<i64> = r.get(8)?;

    let invoice = match invoice_id {
        Some(id) => Some(LinkedInvoice {
            id,
            invoice_number: r.get::<_, Option<String>>(11)?.unwrap_or_default(),
            status: normalize_status(r.get::<_, Option<String>>(12)?.as_deref()),
            total: r.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
            customer_name: r.get(14)?,
        }),
        None => None,
    };
    let vendor = match vendor_id {
        Some(id) => Some(PartySummary::vendor(id, r.get(15)?, r.get(16)?, r.get(17)?)),
        None => None,
    };
    let customer = match customer_id {
        Some(id) => Some(PartySummary::customer(id, r.get(18)?, r.get(19)?, r.get(20)?)),
        None => None,
    };

    Ok(Payment {
        id: r.get(0)?,
        amount: r.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
        date: r.get(2)?,
        payment_method: r.get(3)?,
        reference_number: r.get(4)?,
        notes: r.get(5)?,
        invoice_id,
        vendor_id,
        customer_id,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
        invoice,
        vendor,
        customer,
    })
}

pub fn read_all(conn: &Connection) -> Result<Vec<Payment>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("{SELECT_PAYMENT} ORDER BY p.id"))?;
    let rows = stmt.query_map([], payment_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn read_one(conn: &Connection, id: i64) -> Result<Option<Payment>, rusqlite::Error> {
    conn.query_row(&format!("{SELECT_PAYMENT} WHERE p.id = ?1"), params![id], payment_from_row)
        .optional()
}

pub fn insert(conn: &Connection, d: &PaymentDraft) -> ApiResult<i64> {
    d.check(conn)?;
    let now = now_iso();
    conn.execute(
        r#"INSERT INTO payments (
               amount, date, payment_method, reference_number, notes,
               invoice_id, vendor_id, customer_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"#,
        params![
            d.amount,
            d.date,
            d.payment_method,
            d.reference_number,
            d.notes,
            d.invoice_id,
            d.vendor_id,
            d.customer_id,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update(conn: &Connection, id: i64, d: &PaymentDraft) -> ApiResult<()> {
    d.check(conn)?;
    conn.execute(
        r#"UPDATE payments SET
               amount = ?2, date = ?3, payment_method = ?4, reference_number = ?5, notes = ?6,
               invoice_id = ?7, vendor_id = ?8, customer_id = ?9, updated_at = ?10
           WHERE id = ?1"#,
        params![
            id,
            d.amount,
            d.date,
            d.payment_method,
            d.reference_number,
            d.notes,
            d.invoice_id,
            d.vendor_id,
            d.customer_id,
            now_iso(),
        ],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM payments WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total_amount: f64,
    pub count: usize,
    pub linked_to_invoices: usize,
    pub current_month_total: f64,
}

/// `month_prefix` is `YYYY-MM`.
pub fn summarize(payments: &[Payment], month_prefix: &str) -> PaymentSummary {
    let total_amount: f64 = payments.iter().map(|p| p.amount).sum();
    let current_month_total: f64 = payments
        .iter()
        .filter(|p| p.date.starts_with(month_prefix))
        .map(|p| p.amount)
        .sum();
    PaymentSummary {
        total_amount: round2(total_amount),
        count: payments.len(),
        linked_to_invoices: payments.iter().filter(|p| p.invoice_id.is_some()).count(),
        current_month_total: round2(current_month_total),
    }
}

fn filter_rows(rows: Vec<Payment>, filter: &PaymentFilter) -> Vec<Payment> {
    match trimmed(filter.method.as_deref()) {
        None => rows,
        Some(method) => rows
            .into_iter()
            .filter(|p| {
                p.payment_method
                    .as_deref()
                    .is_some_and(|own| own.eq_ignore_ascii_case(&method))
            })
            .collect(),
    }
}

pub async fn list_payments(
    State(db): State<Db>,
    QueryParams(query): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<PaymentFilter>,
) -> ApiResult<Listing<Payment>> {
    let rows = db.with_read("list_payments", |conn| Ok(read_all(conn)?)).await?;
    listing::apply(filter_rows(rows, &filter), &query)
}

pub async fn payment_summary(State(db): State<Db>) -> ApiResult<Json<PaymentSummary>> {
    let rows = db.with_read("payment_summary", |conn| Ok(read_all(conn)?)).await?;
    let today = OffsetDateTime::now_utc().date();
    let prefix = format!("{:04}-{:02}", today.year(), u8::from(today.month()));
    Ok(Json(summarize(&rows, &prefix)))
}

pub async fn get_payment(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Payment>> {
    db.with_read("get_payment", move |conn| {
        read_one(conn, id)?.ok_or(ApiError::NotFound("Payment not found"))
    })
    .await
    .map(Json)
}

pub async fn create_payment(
    State(db): State<Db>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    let body = require_object(body).map_err(ApiError::BadRequest)?;
    let draft = PaymentDraft::for_create(&body)?;
    let created = db
        .with_write("create_payment", move |conn| {
            let id = insert(conn, &draft)?;
            read_one(conn, id)?.ok_or(ApiError::NotFound("Payment not found"))
        })
        .await?;
    tracing::info!(id = created.id, amount = created.amount, invoice_id = ?created.invoice_id, "payment recorded");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_payment(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Payment>> {
    let body = require_object(body).map_err(ApiError::BadRequest)?;
    db.with_write("update_payment", move |conn| {
        let existing = read_one(conn, id)?.ok_or(ApiError::NotFound("Payment not found"))?;
        let mut draft = PaymentDraft::from(existing);
        draft.apply(&body)?;
        update(conn, id, &draft)?;
        read_one(conn, id)?.ok_or(ApiError::NotFound("Payment not found"))
    })
    .await
    .map(Json)
}

pub async fn delete_payment(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Ack>> {
    let deleted = db.with_write("delete_payment", move |conn| Ok(delete(conn, id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Payment not found"));
    }
    Ok(Json(Ack::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::prepare_connection;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        prepare_connection(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO customers (id, name, email) VALUES (1, 'Acme', 'ap@acme.io');
            INSERT INTO invoices (id, invoice_number, customer_id, status, total)
                VALUES (1, 'INV-100', 1, 'sent', 250);
            "#,
        )
        .unwrap();
        conn
    }

    fn draft(value: Value) -> ApiResult<PaymentDraft> {
        PaymentDraft::for_create(&require_object(value).unwrap())
    }

    #[test]
    fn amount_and_date_required() {
        let err = draft(json!({"amount": 10})).unwrap_err();
        assert_eq!(err.to_string(), "Amount and date are required");
        let err = draft(json!({"amount": -3, "date": "2024-01-01"})).unwrap_err();
        assert_eq!(err.to_string(), "Amount must be greater than zero");

        let conn = conn();
        let blank_date = draft(json!({"amount": 10, "date": " "})).unwrap();
        assert_eq!(insert(&conn, &blank_date).unwrap_err().to_string(), "Payment date is required");
    }

    #[test]
    fn linked_invoice_is_embedded() {
        let conn = conn();
        let d = draft(json!({"amount": "250", "date": "2024-04-02", "invoiceId": "1", "customerId": 1, "paymentMethod": "ach"}))
            .unwrap();
        let id = insert(&conn, &d).unwrap();
        let p = read_one(&conn, id).unwrap().unwrap();
        let invoice = p.invoice.as_ref().unwrap();
        assert_eq!(invoice.invoice_number, "INV-100");
        assert_eq!(invoice.customer_name.as_deref(), Some("Acme"));
        assert_eq!(p.customer.as_ref().map(|c| c.name.as_str()), Some("Acme"));

        let missing = draft(json!({"amount": 1, "date": "2024-04-02", "invoiceId": 9})).unwrap();
        assert_eq!(insert(&conn, &missing).unwrap_err().to_string(), "Invoice not found");
    }

    #[test]
    fn deleting_invoice_unlinks_payment() {
        let conn = conn();
        let id = insert(&conn, &draft(json!({"amount": 5, "date": "2024-04-02", "invoiceId": 1})).unwrap()).unwrap();
        conn.execute("DELETE FROM invoices WHERE id = 1", []).unwrap();
        let p = read_one(&conn, id).unwrap().unwrap();
        assert_eq!(p.invoice_id, None);
        assert!(p.invoice.is_none());
    }

    #[test]
    fn summary_counts_current_month() {
        let conn = conn();
        for (amount, date, invoice) in [(100.0, "2024-06-03", Some(1)), (50.25, "2024-06-20", None), (10.0, "2024-05-31", None)] {
            let d = draft(json!({"amount": amount, "date": date, "invoiceId": invoice})).unwrap();
            insert(&conn, &d).unwrap();
        }
        let s = summarize(&read_all(&conn).unwrap(), "2024-06");
        assert_eq!(s.count, 3);
        assert_eq!(s.linked_to_invoices, 1);
        assert_eq!(s.total_amount, 160.25);
        assert_eq!(s.current_month_total, 150.25);
    }

    #[test]
    fn method_filter_and_amount_sort() {
        let conn = conn();
        for (amount, method) in [(30.0, "card"), (10.0, "Card"), (20.0, "cash")] {
            let d = draft(json!({"amount": amount, "date": "2024-01-01", "paymentMethod": method})).unwrap();
            insert(&conn, &d).unwrap();
        }
        let rows = filter_rows(read_all(&conn).unwrap(), &PaymentFilter { method: Some("CARD".into()) });
        let q = ListQuery { sort: Some("amount".into()), ..Default::default() };
        let Listing::All(rows) = listing::apply(rows, &q).unwrap() else { panic!("expected plain list") };
        let amounts: Vec<f64> = rows.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![10.0, 30.0]);
    }
}
