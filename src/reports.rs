use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::dashboard::{load_expense_facts, load_invoice_facts, ExpenseFacts, InvoiceFacts};
use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::extract::QueryParams;
use crate::util::{format_ymd, parse_date_param, parse_iso_date, round2};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// Inclusive date window; open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Period {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl Period {
    pub fn parse(query: &PeriodQuery) -> ApiResult<Self> {
        let from = parse_date_param("from", query.from.as_deref())?;
        let to = parse_date_param("to", query.to.as_deref())?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ApiError::bad_request("from must not be after to"));
            }
        }
        Ok(Self { from, to })
    }

    /// Records without a usable date only count in a fully open period.
    pub fn contains(&self, date: Option<Date>) -> bool {
        match date {
            Some(d) => self.from.map_or(true, |f| d >= f) && self.to.map_or(true, |t| d <= t),
            None => self.from.is_none() && self.to.is_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSection {
    pub total: f64,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseLine {
    #[serde(rename = "type")]
    pub kind: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSection {
    pub total: f64,
    pub by_type: Vec<ExpenseLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitLoss {
    pub from: Option<String>,
    pub to: Option<String>,
    pub income: IncomeSection,
    pub expenses: ExpenseSection,
    pub net_profit: f64,
}

pub fn profit_loss(invoices: &[InvoiceFacts], expenses: &[ExpenseFacts], period: Period) -> ProfitLoss {
    let paid: Vec<&InvoiceFacts> = invoices
        .iter()
        .filter(|i| i.status == "paid")
        .filter(|i| period.contains(parse_iso_date(i.issue_date.as_deref())))
        .collect();
    let income_total: f64 = paid.iter().map(|i| i.total).sum();

    let mut by_type: HashMap<String, (f64, usize)> = HashMap::new();
    let mut expense_total = 0.0;
    for e in expenses {
        if !period.contains(parse_iso_date(e.date.as_deref())) {
            continue;
        }
        let entry = by_type.entry(e.kind.clone()).or_insert((0.0, 0));
        entry.0 += e.amount;
        entry.1 += 1;
        expense_total += e.amount;
    }
    let mut lines: Vec<ExpenseLine> = by_type
        .into_iter()
        .map(|(kind, (total, count))| ExpenseLine {
            kind,
            total: round2(total),
            count,
        })
        .collect();
    lines.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.kind.cmp(&b.kind)));

    ProfitLoss {
        from: period.from.map(format_ymd),
        to: period.to.map(format_ymd),
        income: IncomeSection {
            total: round2(income_total),
            invoice_count: paid.len(),
        },
        expenses: ExpenseSection {
            total: round2(expense_total),
            by_type: lines,
        },
        net_profit: round2(income_total - expense_total),
    }
}

pub async fn get_profit_loss(
    State(db): State<Db>,
    QueryParams(query): QueryParams<PeriodQuery>,
) -> ApiResult<Json<ProfitLoss>> {
    let period = Period::parse(&query)?;
    let (invoices, expenses) = db
        .with_read("get_profit_loss", |conn| {
            Ok((load_invoice_facts(conn)?, load_expense_facts(conn)?))
        })
        .await?;
    Ok(Json(profit_loss(&invoices, &expenses, period)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn paid(total: f64, issue: &str) -> InvoiceFacts {
        InvoiceFacts {
            invoice_number: format!("INV-{issue}"),
            customer_name: None,
            status: "paid".into(),
            total,
            issue_date: Some(issue.into()),
            due_date: None,
            created_at: None,
        }
    }

    fn spent(kind: &str, amount: f64, date: &str) -> ExpenseFacts {
        ExpenseFacts {
            kind: kind.into(),
            amount,
            date: Some(date.into()),
            created_at: None,
        }
    }

    #[test]
    fn period_validation() {
        let q = PeriodQuery { from: Some("2024-02-01".into()), to: Some("2024-01-01".into()) };
        assert!(Period::parse(&q).is_err());
        let q = PeriodQuery { from: Some("yesterday".into()), to: None };
        assert_eq!(Period::parse(&q).unwrap_err().to_string(), "Invalid from date: yesterday");
        let q = PeriodQuery { from: Some("".into()), to: None };
        assert_eq!(Period::parse(&q).unwrap(), Period::default());
    }

    #[test]
    fn inclusive_window_and_grouping() {
        let invoices = vec![
            paid(1000.0, "2024-01-01"),
            paid(250.0, "2024-01-31"),
            paid(75.0, "2024-02-01"),
            InvoiceFacts { status: "sent".into(), ..paid(999.0, "2024-01-10") },
        ];
        let expenses = vec![
            spent("rent", 400.0, "2024-01-05"),
            spent("software", 30.0, "2024-01-06"),
            spent("software", 20.0, "2024-01-20"),
            spent("rent", 400.0, "2024-02-05"),
        ];
        let period = Period { from: Some(date!(2024 - 01 - 01)), to: Some(date!(2024 - 01 - 31)) };
        let report = profit_loss(&invoices, &expenses, period);

        assert_eq!(report.from.as_deref(), Some("2024-01-01"));
        assert_eq!(report.income.total, 1250.0);
        assert_eq!(report.income.invoice_count, 2);
        assert_eq!(report.expenses.total, 450.0);
        assert_eq!(report.expenses.by_type[0].kind, "rent");
        assert_eq!(report.expenses.by_type[1].total, 50.0);
        assert_eq!(report.expenses.by_type[1].count, 2);
        assert_eq!(report.net_profit, 800.0);
    }

    #[test]
    fn open_period_counts_everything() {
        let report = profit_loss(&[paid(10.0, "2020-05-05")], &[spent("fees", 2.5, "not a date")], Period::default());
        assert_eq!(report.income.total, 10.0);
        assert_eq!(report.expenses.total, 2.5);
        assert_eq!(report.from, None);
    }
}
