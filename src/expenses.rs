use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::{now_iso, Db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Ack, JsonBody, PathParam, QueryParams};
use crate::listing::{self, ListQuery, Listable, Listing, SortColumn, SortDirection, SortKey};
use crate::party::{ensure_party_exists, PartyKind, PartySummary};
use crate::util::{parse_bool, parse_id, parse_iso_date, text_value, trimmed};
use crate::validation::{require_object, sanitize_html, validate_positive_float, validate_required_fields};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub date: String,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub tax_deductible: bool,
    pub tag: Option<String>,
    pub vendor_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub vendor: Option<PartySummary>,
    pub customer: Option<PartySummary>,
}

/// Writable expense columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseDraft {
    pub kind: String,
    pub amount: f64,
    pub date: String,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub tax_deductible: bool,
    pub tag: Option<String>,
    pub vendor_id: Option<i64>,
    pub customer_id: Option<i64>,
}

impl From<Expense> for ExpenseDraft {
    fn from(e: Expense) -> Self {
        Self {
            kind: e.kind,
            amount: e.amount,
            date: e.date,
            payment_method: e.payment_method,
            reference_number: e.reference_number,
            description: e.description,
            tax_deductible: e.tax_deductible,
            tag: e.tag,
            vendor_id: e.vendor_id,
            customer_id: e.customer_id,
        }
    }
}

impl ExpenseDraft {
    /// Overwrites every field present in `patch`.
    pub fn apply(&mut self, patch: &Map<String, Value>) -> ApiResult<()> {
        if let Some(v) = patch.get("type") {
            self.kind = text_value(v).unwrap_or_default();
        }
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
        if let Some(v) = patch.get("description") {
            self.description = text_value(v).map(|d| sanitize_html(&d));
        }
        if let Some(v) = patch.get("taxDeductible") {
            self.tax_deductible = parse_bool(v).unwrap_or(false);
        }
        if let Some(v) = patch.get("tag") {
            self.tag = text_value(v);
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
        validate_required_fields(body, &["type", "amount", "date"])
            .map_err(|_| ApiError::bad_request("Type, amount and date are required"))?;
        let mut draft = Self::default();
        draft.apply(body)?;
        Ok(draft)
    }

    fn check(&self, conn: &Connection) -> ApiResult<()> {
        if self.kind.is_empty() {
            return Err(ApiError::bad_request("Expense type is required"));
        }
        if self.date.is_empty() {
            return Err(ApiError::bad_request("Expense date is required"));
        }
        ensure_party_exists(conn, PartyKind::Vendor, self.vendor_id)?;
        ensure_party_exists(conn, PartyKind::Customer, self.customer_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseFilter {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseColumn {
    Date,
    Amount,
    Type,
}

impl SortColumn for ExpenseColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "date" => Some(Self::Date),
            "amount" => Some(Self::Amount),
            "type" => Some(Self::Type),
            _ => None,
        }
    }

    fn default_column() -> Self {
        Self::Date
    }

    fn default_direction(self) -> SortDirection {
        match self {
            Self::Date => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }
}

impl Listable for Expense {
    type Column = ExpenseColumn;

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.kind.as_str(),
            self.description.as_deref().unwrap_or_default(),
            self.tag.as_deref().unwrap_or_default(),
            self.reference_number.as_deref().unwrap_or_default(),
            self.vendor.as_ref().map(|p| p.name.as_str()).unwrap_or_default(),
            self.customer.as_ref().map(|p| p.name.as_str()).unwrap_or_default(),
        ]
    }

    fn sort_key(&self, column: ExpenseColumn) -> SortKey {
        match column {
            ExpenseColumn::Date => SortKey::Date(parse_iso_date(Some(self.date.as_str()))),
            ExpenseColumn::Amount => SortKey::Number(self.amount),
            ExpenseColumn::Type => SortKey::text(Some(self.kind.as_str())),
        }
    }
}

const SELECT_EXPENSE: &str = r#"SELECT e.id, e.type, e.amount, e.date, e.payment_method, e.reference_number,
       e.description, e.tax_deductible, e.tag, e.vendor_id, e.customer_id,
       e.created_at, e.updated_at,
       v.company, v.name, v.email,
       c.name, c.company, c.email
  FROM expenses e
  LEFT JOIN vendors v ON v.id = e.vendor_id
  LEFT JOIN customers c ON c.id = e.customer_id"#;

fn expense_from_row(r: &Row<'_>) -> rusqlite::Result<Expense> {
    let vendor_id: Option<i64> = r.get(9)?;
    let customer_id: Option<i64> = r.get(10)?;
    let vendor = match vendor_id {
        Some(id) => Some(PartySummary::vendor(id, r.get(13)?, r.get(14)?, r.get(15)?)),
        None => None,
    };
    let customer = match customer_id {
        Some(id) => Some(PartySummary::customer(id, r.get(16)?, r.get(17)?, r.get(18)?)),
        None => None,
    };
    Ok(Expense {
        id: r.get(0)?,
        kind: r.get(1)?,
        amount: r.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        date: r.get(3)?,
        payment_method: r.get(4)?,
        reference_number: r.get(5)?,
        description: r.get(6)?,
        tax_deductible: r.get::<_, Option<bool>>(7)?.unwrap_or(false),
        tag: r.get(8)?,
        vendor_id,
        customer_id,
        created_at: r.get(11)?,
        updated_at: r.get(12)?,
        vendor,
        customer,
    })
}

pub fn read_all(conn: &Connection) -> Result<Vec<Expense>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("{SELECT_EXPENSE} ORDER BY e.id"))?;
    let rows = stmt.query_map([], expense_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn read_one(conn: &Connection, id: i64) -> Result<Option<Expense>, rusqlite::Error> {
    conn.query_row(&format!("{SELECT_EXPENSE} WHERE e.id = ?1"), params![id], expense_from_row)
        .optional()
}

pub fn insert(conn: &Connection, d: &ExpenseDraft) -> ApiResult<i64> {
    d.check(conn)?;
    let now = now_iso();
    conn.execute(
        r#"INSERT INTO expenses (
               type, amount, date, payment_method, reference_number, description,
               tax_deductible, tag, vendor_id, customer_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)"#,
        params![
            d.kind,
            d.amount,
            d.date,
            d.payment_method,
            d.reference_number,
            d.description,
            d.tax_deductible,
            d.tag,
            d.vendor_id,
            d.customer_id,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update(conn: &Connection, id: i64, d: &ExpenseDraft) -> ApiResult<()> {
    d.check(conn)?;
    conn.execute(
        r#"UPDATE expenses SET
               type = ?2, amount = ?3, date = ?4, payment_method = ?5, reference_number = ?6,
               description = ?7, tax_deductible = ?8, tag = ?9, vendor_id = ?10,
               customer_id = ?11, updated_at = ?12
           WHERE id = ?1"#,
        params![
            id,
            d.kind,
            d.amount,
            d.date,
            d.payment_method,
            d.reference_number,
            d.description,
            d.tax_deductible,
            d.tag,
            d.vendor_id,
            d.customer_id,
            now_iso(),
        ],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM expenses WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

fn filter_rows(rows: Vec<Expense>, filter: &ExpenseFilter) -> Vec<Expense> {
    let kind = trimmed(filter.kind.as_deref());
    let tag = trimmed(filter.tag.as_deref());
    rows.into_iter()
        .filter(|e| kind.as_deref().map_or(true, |k| e.kind.eq_ignore_ascii_case(k)))
        .filter(|e| {
            tag.as_deref()
                .map_or(true, |t| e.tag.as_deref().is_some_and(|own| own.eq_ignore_ascii_case(t)))
        })
        .collect()
}

pub async fn list_expenses(
    State(db): State<Db>,
    QueryParams(query): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<ExpenseFilter>,
) -> ApiResult<Listing<Expense>> {
    let rows = db.with_read("list_expenses", |conn| Ok(read_all(conn)?)).await?;
    listing::apply(filter_rows(rows, &filter), &query)
}

pub async fn get_expense(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Expense>> {
    db.with_read("get_expense", move |conn| {
        read_one(conn, id)?.ok_or(ApiError::NotFound("Expense not found"))
    })
    .await
    .map(Json)
}

pub async fn create_expense(
    State(db): State<Db>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    let body = require_object(body).map_err(ApiError::BadRequest)?;
    let draft = ExpenseDraft::for_create(&body)?;
    let created = db
        .with_write("create_expense", move |conn| {
            let id = insert(conn, &draft)?;
            read_one(conn, id)?.ok_or(ApiError::NotFound("Expense not found"))
        })
        .await?;
    tracing::info!(id = created.id, amount = created.amount, "expense created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_expense(
    State(db): State<Db>,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Expense>> {
    let body = require_object(body).map_err(ApiError::BadRequest)?;
    db.with_write("update_expense", move |conn| {
        let existing = read_one(conn, id)?.ok_or(ApiError::NotFound("Expense not found"))?;
        let mut draft = ExpenseDraft::from(existing);
        draft.apply(&body)?;
        update(conn, id, &draft)?;
        read_one(conn, id)?.ok_or(ApiError::NotFound("Expense not found"))
    })
    .await
    .map(Json)
}

pub async fn delete_expense(State(db): State<Db>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Ack>> {
    let deleted = db.with_write("delete_expense", move |conn| Ok(delete(conn, id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Expense not found"));
    }
    Ok(Json(Ack::ok()))
}
