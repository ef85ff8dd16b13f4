//! Headline metrics, the six-month revenue trend and the latest invoices.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use rusqlite::Connection;
use serde::Serialize;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

use crate::db::Db;
use crate::error::ApiResult;
use crate::util::{format_ymd, normalize_status, parse_iso_date, round2};

/// Just the invoice columns the dashboard looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceFacts {
    pub invoice_number: String,
    pub customer_name: Option<String>,
    pub status: String,
    pub total: f64,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
}

impl InvoiceFacts {
    fn effective_date(&self) -> Option<Date> {
        parse_iso_date(self.issue_date.as_deref()).or_else(|| parse_iso_date(self.created_at.as_deref()))
    }

    fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseFacts {
    pub kind: String,
    pub amount: f64,
    pub date: Option<String>,
    pub created_at: Option<String>,
}

impl ExpenseFacts {
    fn effective_date(&self) -> Option<Date> {
        parse_iso_date(self.date.as_deref()).or_else(|| parse_iso_date(self.created_at.as_deref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u8,
}

impl MonthKey {
    pub fn of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }

    pub fn shift(self, offset: i32) -> Self {
        let index = self.year * 12 + i32::from(self.month) - 1 + offset;
        Self {
            year: index.div_euclid(12),
            month: (index.rem_euclid(12) + 1) as u8,
        }
    }

    /// `Jan 2024`.
    pub fn label(self) -> String {
        let fallback = || format!("{:02}/{}", self.month, self.year);
        let Ok(month) = Month::try_from(self.month) else {
            return fallback();
        };
        Date::from_calendar_date(self.year, month, 1)
            .ok()
            .and_then(|d| d.format(format_description!("[month repr:short] [year]")).ok())
            .unwrap_or_else(fallback)
    }
}

pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current == 0.0 { 0.0 } else { 100.0 };
    }
    (current - previous) / previous * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    pub amount: f64,
    pub change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutstandingMetric {
    pub amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_revenue: Metric,
    pub total_expenses: Metric,
    pub outstanding_invoices: OutstandingMetric,
    pub net_profit: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub label: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentInvoice {
    pub invoice_number: String,
    pub customer_name: String,
    pub total: f64,
    pub status: String,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub metrics: Metrics,
    pub revenue_trend: Vec<TrendPoint>,
    pub recent_invoices: Vec<RecentInvoice>,
}

pub const TREND_MONTHS: i32 = 6;
pub const RECENT_INVOICES: usize = 5;

pub fn build(invoices: &[InvoiceFacts], expenses: &[ExpenseFacts], today: Date) -> Dashboard {
    let total_revenue: f64 = invoices.iter().filter(|i| i.is_paid()).map(|i| i.total).sum();
    let total_expenses: f64 = expenses.iter().map(|e| e.amount).sum();
    let outstanding: Vec<&InvoiceFacts> = invoices.iter().filter(|i| !i.is_paid()).collect();
    let outstanding_total: f64 = outstanding.iter().map(|i| i.total).sum();

    let mut revenue_by_month: HashMap<MonthKey, f64> = HashMap::new();
    for invoice in invoices.iter().filter(|i| i.is_paid()) {
        if let Some(d) = invoice.effective_date() {
            *revenue_by_month.entry(MonthKey::of(d)).or_default() += invoice.total;
        }
    }
    let mut expenses_by_month: HashMap<MonthKey, f64> = HashMap::new();
    for expense in expenses {
        if let Some(d) = expense.effective_date() {
            *expenses_by_month.entry(MonthKey::of(d)).or_default() += expense.amount;
        }
    }

    let current = MonthKey::of(today);
    let previous = current.shift(-1);
    let month_total = |map: &HashMap<MonthKey, f64>, key: MonthKey| map.get(&key).copied().unwrap_or(0.0);

    let current_revenue = month_total(&revenue_by_month, current);
    let previous_revenue = month_total(&revenue_by_month, previous);
    let current_expenses = month_total(&expenses_by_month, current);
    let previous_expenses = month_total(&expenses_by_month, previous);

    let metrics = Metrics {
        total_revenue: Metric {
            amount: round2(total_revenue),
            change: round2(percent_change(current_revenue, previous_revenue)),
        },
        total_expenses: Metric {
            amount: round2(total_expenses),
            change: round2(percent_change(current_expenses, previous_expenses)),
        },
        outstanding_invoices: OutstandingMetric {
            amount: round2(outstanding_total),
            count: outstanding.len(),
        },
        net_profit: Metric {
            amount: round2(total_revenue - total_expenses),
            change: round2(percent_change(
                current_revenue - current_expenses,
                previous_revenue - previous_expenses,
            )),
        },
    };

    let revenue_trend = (1 - TREND_MONTHS..=0)
        .map(|offset| {
            let month = current.shift(offset);
            TrendPoint {
                label: month.label(),
                total: round2(month_total(&revenue_by_month, month)),
            }
        })
        .collect();

    let mut recent: Vec<&InvoiceFacts> = invoices.iter().collect();
    recent.sort_by(|a, b| b.effective_date().cmp(&a.effective_date()));
    let recent_invoices = recent
        .into_iter()
        .take(RECENT_INVOICES)
        .map(|i| RecentInvoice {
            invoice_number: i.invoice_number.clone(),
            customer_name: i.customer_name.clone().unwrap_or_else(|| "Unknown".to_string()),
            total: round2(i.total),
            status: i.status.clone(),
            due_date: parse_iso_date(i.due_date.as_deref()).map(format_ymd),
        })
        .collect();

    Dashboard {
        metrics,
        revenue_trend,
        recent_invoices,
    }
}

pub fn load_invoice_facts(conn: &Connection) -> Result<Vec<InvoiceFacts>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        r#"SELECT i.invoice_number, c.name, i.status, i.total, i.issue_date, i.due_date, i.created_at
             FROM invoices i
             LEFT JOIN customers c ON c.id = i.customer_id
            ORDER BY i.id"#,
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(InvoiceFacts {
            invoice_number: r.get(0)?,
            customer_name: r.get(1)?,
            status: normalize_status(r.get::<_, Option<String>>(2)?.as_deref()),
            total: r.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            issue_date: r.get(4)?,
            due_date: r.get(5)?,
            created_at: r.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn load_expense_facts(conn: &Connection) -> Result<Vec<ExpenseFacts>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT type, amount, date, created_at FROM expenses ORDER BY id")?;
    let rows = stmt.query_map([], |r| {
        Ok(ExpenseFacts {
            kind: r.get(0)?,
            amount: r.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
            date: r.get(2)?,
            created_at: r.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub async fn get_dashboard(State(db): State<Db>) -> ApiResult<Json<Dashboard>> {
    let (invoices, expenses) = db
        .with_read("get_dashboard", |conn| {
            Ok((load_invoice_facts(conn)?, load_expense_facts(conn)?))
        })
        .await?;
    let today = OffsetDateTime::now_utc().date();
    Ok(Json(build(&invoices, &expenses, today)))
}
