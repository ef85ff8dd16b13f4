use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};

use crate::db::{now_iso, Db};
use crate::error::{is_constraint_violation, ApiError, ApiResult};
use crate::extract::{Ack, JsonBody, PathParam, QueryParams};
use crate::listing::{self, ListQuery, Listable, Listing, SortColumn, SortDirection, SortKey};
use crate::party::{ensure_party_exists, PartyKind, PartySummary};
use crate::totals::{self, LineItemInput, PricedLine};
use crate::util::{
    lenient_f64, lenient_id, lenient_string, normalize_status, null_as_empty, parse_iso_date, trimmed,
};
use crate::validation::{sanitize_html_opt, sanitize_string, validate_string_length};

pub const MAX_INVOICE_NUMBER_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub id: i64,
    pub description: String,
    pub quantity: f64,
    pub rate: f64,
    pub tax_rate: Option<f64>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub customer_id: i64,
    pub status: String,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub tax_rate: f64,
    pub subtotal: f64,
    pub tax_total: f64,
    pub discount_total: f64,
    pub total: f64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub customer: Option<PartySummary>,
    pub line_items: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn customer_name(&self) -> Option<&str> {
        self.customer.as_ref().map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub customer_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_terms: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub terms: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub tax_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub discount_total: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub line_items: Vec<LineItemInput>,
}

/// A validated invoice with its priced lines.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub customer_id: i64,
    pub status: String,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub tax_rate: f64,
    pub lines: Vec<PricedLine>,
    pub totals: totals::InvoiceTotals,
}

impl InvoiceInput {
    pub fn validate(self) -> ApiResult<NewInvoice> {
        let number = sanitize_string(self.invoice_number.as_deref(), None, false);
        let (Some(invoice_number), Some(customer_id)) = (number, self.customer_id) else {
            return Err(ApiError::bad_request("Invoice number and customer are required"));
        };
        validate_string_length(&invoice_number, 1, Some(MAX_INVOICE_NUMBER_LEN), "Invoice number")
            .map_err(ApiError::BadRequest)?;
        let tax_rate = self.tax_rate.unwrap_or(0.0);
        let (lines, totals) =
            totals::compute(&self.line_items, tax_rate, self.discount_total.unwrap_or(0.0));

        Ok(NewInvoice {
            invoice_number,
            customer_id,
            status: normalize_status(self.status.as_deref()),
            issue_date: trimmed(self.issue_date.as_deref()),
            due_date: trimmed(self.due_date.as_deref()),
            payment_terms: trimmed(self.payment_terms.as_deref()),
            notes: sanitize_html_opt(sanitize_string(self.notes.as_deref(), Some(5000), false)),
            terms: sanitize_html_opt(sanitize_string(self.terms.as_deref(), Some(5000), false)),
            tax_rate,
            lines,
            totals,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceColumn {
    Id,
    InvoiceNumber,
    IssueDate,
    DueDate,
    Total,
    Status,
    Customer,
}

impl SortColumn for InvoiceColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "invoiceNumber" => Some(Self::InvoiceNumber),
            "issueDate" => Some(Self::IssueDate),
            "dueDate" => Some(Self::DueDate),
            "total" => Some(Self::Total),
            "status" => Some(Self::Status),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }

    fn default_column() -> Self {
        Self::Id
    }

    fn default_direction(self) -> SortDirection {
        match self {
            Self::Id => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }
}

impl Listable for Invoice {
    type Column = InvoiceColumn;

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.invoice_number.as_str(),
            self.customer_name().unwrap_or_default(),
            self.customer
                .as_ref()
                .and_then(|c| c.email.as_deref())
                .unwrap_or_default(),
            self.status.as_str(),
            self.notes.as_deref().unwrap_or_default(),
        ]
    }

    fn sort_key(&self, column: InvoiceColumn) -> SortKey {
        match column {
            InvoiceColumn::Id => SortKey::Number(self.id as f64),
            InvoiceColumn::InvoiceNumber => SortKey::text(Some(self.invoice_number.as_str())),
            InvoiceColumn::IssueDate => SortKey::Date(parse_iso_date(self.issue_date.as_deref())),
            InvoiceColumn::DueDate => SortKey::Date(parse_iso_date(self.due_date.as_deref())),
            InvoiceColumn::Total => SortKey::Number(self.total),
            InvoiceColumn::Status => SortKey::text(Some(self.status.as_str())),
            InvoiceColumn::Customer => SortKey::text(self.customer_name()),
        }
    }
}

const SELECT_INVOICE: &str = r#"SELECT i.id, i.invoice_number, i.customer_id, i.status, i.issue_date, i.due_date,
       i.payment_terms, i.notes, i.terms, i.tax_rate, i.subtotal, i.tax_total,
       i.discount_total, i.total, i.created_at, i.updated_at,
       c.id, c.name, c.company, c.email
  FROM invoices i
  LEFT JOIN customers c ON c.id = i.customer_id"#;

fn invoice_from_row(r: &Row<'_>) -> rusqlite::Result<Invoice> {
    let customer = match r.get::<_, Option<i64>>(16)? {
        Some(cid) => Some(PartySummary::customer(cid, r.get(17)?, r.get(18)?, r.get(19)?)),
        None => None,
    };
    Ok(Invoice {
        id: r.get(0)?,
        invoice_number: r.get(1)?,
        customer_id: r.get(2)?,
        status: normalize_status(r.get::<_, Option<String>>(3)?.as_deref()),
        issue_date: r.get(4)?,
        due_date: r.get(5)?,
        payment_terms: r.get(6)?,
        notes: r.get(7)?,
        terms: r.get(8)?,
        tax_rate: r.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
        subtotal: r.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
        tax_total: r.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
        discount_total: r.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
        total: r.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
        created_at: r.get(14)?,
        updated_at: r.get(15)?,
        customer,
        line_items: Vec::new(),
    })
}

fn line_from_row(r: &Row<'_>) -> rusqlite::Result<(i64, InvoiceLine)> {
    let quantity: f64 = r.get::<_, Option<f64>>(3)?.unwrap_or(0.0);
    let rate: f64 = r.get::<_, Option<f64>>(4)?.unwrap_or(0.0);
    Ok((
        r.get(1)?,
        InvoiceLine {
            id: r.get(0)?,
            description: r.get(2)?,
            quantity,
            rate,
            tax_rate: r.get(5)?,
            amount: totals::line_amount(quantity, rate),
        },
    ))
}

fn read_lines(conn: &Connection, invoice_id: Option<i64>) -> Result<HashMap<i64, Vec<InvoiceLine>>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        r#"SELECT id, invoice_id, description, quantity, rate, tax_rate
             FROM invoice_items
            WHERE (?1 IS NULL OR invoice_id = ?1)
            ORDER BY id"#,
    )?;
    let rows = stmt.query_map(params![invoice_id], line_from_row)?;
    let mut out: HashMap<i64, Vec<InvoiceLine>> = HashMap::new();
    for row in rows {
        let (invoice_id, line) = row?;
        out.entry(invoice_id).or_default().push(line);
    }
    Ok(out)
}

pub fn read_all(conn: &Connection) -> Result<Vec<Invoice>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("{SELECT_INVOICE} ORDER BY i.id"))?;
    let rows = stmt.query_map([], invoice_from_row)?;
    let mut lines = read_lines(conn, None)?;
    let mut out = Vec::new();
    for row in rows {
        let mut invoice = row?;
        invoice.line_items = lines.remove(&invoice.id).unwrap_or_default();
        out.push(invoice);
    }
    Ok(out)
}

pub fn read_one(conn: &Connection, id: i64) -> Result<Option<Invoice>, rusqlite::Error> {
    let invoice = conn
        .query_row(&format!("{SELECT_INVOICE} WHERE i.id = ?1"), params![id], invoice_from_row)
        .optional()?;
    let Some(mut invoice) = invoice else { return Ok(None) };
    invoice.line_items = read_lines(conn, Some(id))?.remove(&id).unwrap_or_default();
    Ok(Some(invoice))
}

pub(crate) fn number_taken(conn: &Connection, number: &str, except: Option<i64>) -> Result<bool, rusqlite::Error> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(1) FROM invoices WHERE invoice_number = ?1 AND (?2 IS NULL OR id <> ?2)",
        params![number, except],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn check_references(conn: &Connection, inv: &NewInvoice, except: Option<i64>) -> ApiResult<()> {
    ensure_party_exists(conn, PartyKind::Customer, Some(inv.customer_id))?;
    if number_taken(conn, &inv.invoice_number, except)? {
        return Err(ApiError::bad_request("Invoice number must be unique"));
    }
    Ok(())
}

fn write_lines(tx: &Transaction<'_>, invoice_id: i64, lines: &[PricedLine]) -> Result<(), rusqlite::Error> {
    tx.execute("DELETE FROM invoice_items WHERE invoice_id = ?1", params![invoice_id])?;
    let mut stmt = tx.prepare(
        "INSERT INTO invoice_items (invoice_id, description, quantity, rate, tax_rate) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for line in lines {
        stmt.execute(params![invoice_id, line.description, line.quantity, line.rate, line.tax_rate])?;
    }
    Ok(())
}

fn unique_violation(err: rusqlite::Error) -> ApiError {
    if is_constraint_violation(&err) {
        ApiError::bad_request("Invoice number must be unique")
    } else {
        err.into()
    }
}

pub fn insert(conn: &mut Connection, inv: &NewInvoice) -> ApiResult<i64> {
    let tx = conn.transaction()?;
    let id = insert_in(&tx, inv)?;
    tx.commit()?;
    Ok(id)
}

/// Inserts within a caller-owned transaction; the caller commits.
pub fn insert_in(tx: &Transaction<'_>, inv: &NewInvoice) -> ApiResult<i64> {
    check_references(tx, inv, None)?;
    let now = now_iso();
    tx.execute(
        r#"INSERT INTO invoices (
               invoice_number, customer_id, status, issue_date, due_date, payment_terms,
               notes, terms, tax_rate, subtotal, tax_total, discount_total, total,
               created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)"#,
        params![
            inv.invoice_number,
            inv.customer_id,
            inv.status,
            inv.issue_date,
            inv.due_date,
            inv.payment_terms,
            inv.notes,
            inv.terms,
            inv.tax_rate,
            inv.totals.subtotal,
            inv.totals.tax_total,
            inv.totals.discount_total,
            inv.totals.total,
            now,
        ],
    )
    .map_err(unique_violation)?;
    let id = tx.last_insert_rowid();
    write_lines(tx, id, &inv.lines)?;
    Ok(id)
}

pub fn update(conn: &mut Connection, id: i64, inv: &NewInvoice) -> ApiResult<()> {
    check_references(conn, inv, Some(id))?;
    let tx = conn.transaction()?;
    tx.execute(
        r#"UPDATE invoices SET
               invoice_number = ?2, customer_id = ?3, status = ?4, issue_date = ?5, due_date = ?6,
               payment_terms = ?7, notes = ?8, terms = ?9, tax_rate = ?10, subtotal = ?11,
               tax_total = ?12, discount_total = ?13, total = ?14, updated_at = ?15
           WHERE id = ?1"#,
        params![
            id,
            inv.invoice_number,
            inv.customer_id,
            inv.status,
            inv.issue_date,
            inv.due_date,
            inv.payment_terms,
            inv.notes,
            inv.terms,
            inv.tax_rate,
            inv.totals.subtotal,
            inv.totals.tax_total,
            inv.totals.discount_total,
            inv.totals.total,
            now_iso(),
        ],
    )
    .map_err(unique_violation)?;
    write_lines(&tx, id, &inv.lines)?;
    tx.commit()?;
    Ok(())
}

/// Line items cascade; linked payments lose the link.
pub fn delete(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

fn filter_rows(rows: Vec<Invoice>, filter: &InvoiceFilter) -> Vec<Invoice> {
    match trimmed(filter.status.as_deref()) {
        None => rows,
        Some(status) => {
            let status = status.to_lowercase();
            rows.into_iter().filter(|i| i.status == status).collect()
        }
    }
}

pub async fn list_invoices(
    State(db): State<Db>,
    QueryParams(query): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<InvoiceFilter>,
) -> ApiResult<Listing<Invoice>> {
    let rows = db.with_read("list_invoices", |conn| Ok(read_all(conn)?)).await?;
    listing::apply(filter_rows(rows, &filter), &query)
}

pub async fn get_invoice(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Invoice>> {
    db.with_read("get_invoice", move |conn| {
        read_one(conn, id)?.ok_or(ApiError::NotFound("Invoice not found"))
    })
    .await
    .map(Json)
}

pub async fn create_invoice(
    State(db): State<Db>,
    JsonBody(input): JsonBody<InvoiceInput>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    let invoice = input.validate()?;
    let created = db
        .with_write("create_invoice", move |conn| {
            let id = insert(conn, &invoice)?;
            read_one(conn, id)?.ok_or(ApiError::NotFound("Invoice not found"))
        })
        .await?;
    tracing::info!(id = created.id, number = %created.invoice_number, total = created.total, "invoice created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_invoice(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<InvoiceInput>,
) -> ApiResult<Json<Invoice>> {
    db.with_write("update_invoice", move |conn| {
        if read_one(conn, id)?.is_none() {
            return Err(ApiError::NotFound("Invoice not found"));
        }
        let invoice = input.validate()?;
        update(conn, id, &invoice)?;
        read_one(conn, id)?.ok_or(ApiError::NotFound("Invoice not found"))
    })
    .await
    .map(Json)
}

pub async fn delete_invoice(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Ack>> {
    let deleted = db.with_write("delete_invoice", move |conn| Ok(delete(conn, id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Invoice not found"));
    }
    tracing::info!(id, "invoice deleted");
    Ok(Json(Ack::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::prepare_connection;
    use serde_json::json;

    fn conn_with_customer() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        prepare_connection(&conn).unwrap();
        conn.execute(
            "INSERT INTO customers (name, email, company) VALUES ('Acme', 'ap@acme.io', 'Acme Inc')",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        (conn, id)
    }

    fn payload(number: &str, customer_id: i64) -> NewInvoice {
        serde_json::from_value::<InvoiceInput>(json!({
            "invoiceNumber": number,
            "customerId": customer_id.to_string(),
            "status": "SENT",
            "issueDate": "2024-05-01",
            "lineItems": [
                {"description": "Consulting Services", "quantity": 10, "rate": 100, "taxRate": 10},
                {"description": "Software License", "quantity": 1, "rate": 500, "taxRate": 10},
                {"description": "", "quantity": 3, "rate": 3}
            ]
        }))
        .unwrap()
        .validate()
        .unwrap()
    }

    #[test]
    fn required_fields() {
        let err = InvoiceInput { customer_id: Some(1), ..Default::default() }
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invoice number and customer are required");

        let input: InvoiceInput =
            serde_json::from_value(json!({"invoiceNumber": "INV-9", "customerId": "null"})).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn null_line_items_read_as_none() {
        let inv = serde_json::from_value::<InvoiceInput>(json!({
            "invoiceNumber": "INV-1",
            "customerId": 1,
            "lineItems": null
        }))
        .unwrap()
        .validate()
        .unwrap();
        assert!(inv.lines.is_empty());
        assert_eq!(inv.totals.total, 0.0);
    }

    #[test]
    fn long_invoice_numbers_are_rejected_not_truncated() {
        let at_limit = "N".repeat(MAX_INVOICE_NUMBER_LEN);
        let input = InvoiceInput {
            invoice_number: Some(at_limit.clone()),
            customer_id: Some(1),
            ..Default::default()
        };
        assert_eq!(input.validate().unwrap().invoice_number, at_limit);

        let input = InvoiceInput {
            invoice_number: Some(format!("{at_limit}-A")),
            customer_id: Some(1),
            ..Default::default()
        };
        assert_eq!(
            input.validate().unwrap_err().to_string(),
            "Invoice number must not exceed 64 characters"
        );
    }

    #[test]
    fn create_computes_totals_and_lines() {
        let (mut conn, cid) = conn_with_customer();
        let id = insert(&mut conn, &payload("INV-001", cid)).unwrap();
        let inv = read_one(&conn, id).unwrap().unwrap();
        assert_eq!(inv.status, "sent");
        assert_eq!(inv.subtotal, 1500.0);
        assert_eq!(inv.tax_total, 150.0);
        assert_eq!(inv.total, 1650.0);
        assert_eq!(inv.line_items.len(), 2);
        assert_eq!(inv.line_items[0].amount, 1000.0);
        assert_eq!(inv.customer.as_ref().map(|c| c.name.as_str()), Some("Acme"));
    }

    #[test]
    fn duplicate_numbers_and_unknown_customers_are_rejected() {
        let (mut conn, cid) = conn_with_customer();
        insert(&mut conn, &payload("INV-001", cid)).unwrap();
        let err = insert(&mut conn, &payload("INV-001", cid)).unwrap_err();
        assert_eq!(err.to_string(), "Invoice number must be unique");
        let err = insert(&mut conn, &payload("INV-002", cid + 50)).unwrap_err();
        assert_eq!(err.to_string(), "Customer not found");
    }

    #[test]
    fn update_replaces_line_items_and_keeps_own_number() {
        let (mut conn, cid) = conn_with_customer();
        let id = insert(&mut conn, &payload("INV-001", cid)).unwrap();
        let changed: NewInvoice = serde_json::from_value::<InvoiceInput>(json!({
            "invoiceNumber": "INV-001",
            "customerId": cid,
            "status": "overdue",
            "taxRate": 5,
            "discountTotal": "10",
            "lineItems": [{"description": "Retainer", "quantity": 2, "rate": 100}]
        }))
        .unwrap()
        .validate()
        .unwrap();
        update(&mut conn, id, &changed).unwrap();

        let inv = read_one(&conn, id).unwrap().unwrap();
        assert_eq!(inv.status, "sent");
        assert_eq!(inv.line_items.len(), 1);
        assert_eq!(inv.total, 200.0 + 10.0 - 10.0);
        let stored: i64 = conn
            .query_row("SELECT COUNT(1) FROM invoice_items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn delete_cascades_items() {
        let (mut conn, cid) = conn_with_customer();
        let id = insert(&mut conn, &payload("INV-001", cid)).unwrap();
        assert!(delete(&conn, id).unwrap());
        let stored: i64 = conn
            .query_row("SELECT COUNT(1) FROM invoice_items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[test]
    fn newest_first_and_status_filter() {
        let (mut conn, cid) = conn_with_customer();
        insert(&mut conn, &payload("INV-001", cid)).unwrap();
        let mut draft = payload("INV-002", cid);
        draft.status = "draft".into();
        insert(&mut conn, &draft).unwrap();

        let Listing::All(rows) = listing::apply(read_all(&conn).unwrap(), &ListQuery::default()).unwrap() else {
            panic!("expected plain list")
        };
        assert_eq!(rows[0].invoice_number, "INV-002");

        let sent = filter_rows(rows, &InvoiceFilter { status: Some("Sent".into()) });
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].invoice_number, "INV-001");
    }
}
