//! Invoice line-item arithmetic.

use serde::{Deserialize, Serialize};

use crate::util::{lenient_f64, lenient_string};

/// A line item as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub tax_rate: Option<f64>,
}

/// A line item that survived parsing, with its computed amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub description: String,
    pub quantity: f64,
    pub rate: f64,
    pub tax_rate: Option<f64>,
    pub amount: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub tax_total: f64,
    pub discount_total: f64,
    pub total: f64,
}

pub fn line_amount(quantity: f64, rate: f64) -> f64 {
    quantity * rate
}

/// Prices every line and sums the invoice.
///
/// Lines without a description are dropped. A line's own tax rate wins over
/// the invoice-level one.
pub fn compute(
    items: &[LineItemInput],
    invoice_tax_rate: f64,
    discount_total: f64,
) -> (Vec<PricedLine>, InvoiceTotals) {
    let mut lines = Vec::with_capacity(items.len());
    let mut subtotal = 0.0;
    let mut tax_total = 0.0;

    for item in items {
        let description = item.description.as_deref().unwrap_or_default().trim();
        if description.is_empty() {
            continue;
        }
        let quantity = item.quantity.unwrap_or(0.0);
        let rate = item.rate.unwrap_or(0.0);
        let amount = line_amount(quantity, rate);
        let effective_rate = item.tax_rate.unwrap_or(invoice_tax_rate);
        let tax = amount * (effective_rate / 100.0);

        subtotal += amount;
        tax_total += tax;
        lines.push(PricedLine {
            description: description.to_string(),
            quantity,
            rate,
            tax_rate: item.tax_rate,
            amount,
            tax,
        });
    }

    let totals = InvoiceTotals {
        subtotal,
        tax_total,
        discount_total,
        total: subtotal + tax_total - discount_total,
    };
    (lines, totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str, quantity: f64, rate: f64, tax_rate: Option<f64>) -> LineItemInput {
        LineItemInput {
            description: Some(description.to_string()),
            quantity: Some(quantity),
            rate: Some(rate),
            tax_rate,
        }
    }

    #[test]
    fn per_line_tax_rates() {
        let items = vec![
            item("Consulting Services", 10.0, 100.0, Some(10.0)),
            item("Software License", 1.0, 500.0, Some(10.0)),
        ];
        let (lines, totals) = compute(&items, 0.0, 0.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(totals.subtotal, 1500.0);
        assert_eq!(totals.tax_total, 150.0);
        assert_eq!(totals.total, 1650.0);
    }

    #[test]
    fn invoice_rate_applies_to_lines_without_their_own() {
        let items = vec![item("Design", 2.0, 50.0, None), item("Hosting", 1.0, 100.0, Some(0.0))];
        let (_, totals) = compute(&items, 20.0, 15.0);
        assert_eq!(totals.subtotal, 200.0);
        assert_eq!(totals.tax_total, 20.0);
        assert_eq!(totals.discount_total, 15.0);
        assert_eq!(totals.total, 205.0);
    }

    #[test]
    fn blank_descriptions_and_missing_numbers() {
        let items = vec![
            item("   ", 3.0, 3.0, None),
            LineItemInput {
                description: Some(" Support ".into()),
                quantity: None,
                rate: Some(40.0),
                tax_rate: None,
            },
        ];
        let (lines, totals) = compute(&items, 10.0, 0.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].description, "Support");
        assert_eq!(lines[0].amount, 0.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn lenient_json_items() {
        let items: Vec<LineItemInput> = serde_json::from_str(
            r#"[{"description":"Audit","quantity":"3","rate":"250.5"},{"description":"Travel","quantity":"","rate":null}]"#,
        )
        .unwrap();
        let (lines, totals) = compute(&items, 0.0, 1.5);
        assert_eq!(lines[0].amount, 751.5);
        assert_eq!(lines[1].amount, 0.0);
        assert_eq!(totals.total, 750.0);
    }
}
