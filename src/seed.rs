//! Random demo records for a fresh database.

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{Connection, Transaction};
use time::{Date, Duration, OffsetDateTime};

use crate::customers::{self, NewCustomer, DEFAULT_PAYMENT_TERMS};
use crate::error::ApiResult;
use crate::expenses::{self, ExpenseDraft};
use crate::invoices::{self, InvoiceInput};
use crate::party::Address;
use crate::payments::{self, PaymentDraft};
use crate::totals::LineItemInput;
use crate::util::format_ymd;
use crate::vendors::{self, NewVendor};

const FIRST_NAMES: &[&str] = &[
    "Ava", "Liam", "Maya", "Noah", "Zoe", "Ethan", "Iris", "Owen", "Nora", "Felix", "Ruth", "Caleb",
];
const LAST_NAMES: &[&str] = &[
    "Hart", "Nguyen", "Okafor", "Silva", "Berg", "Patel", "Moreau", "Kowalski", "Reyes", "Lind",
];
const COMPANY_WORDS: &[&str] = &[
    "Summit", "Harbor", "Cedar", "Atlas", "Beacon", "Granite", "Willow", "Vertex", "Pioneer", "Lumen",
];
const COMPANY_SUFFIXES: &[&str] = &["LLC", "Inc", "Group", "Partners", "Co", "Studio", "Labs"];
const CITIES: &[(&str, &str)] = &[
    ("Austin", "TX"),
    ("Denver", "CO"),
    ("Portland", "OR"),
    ("Raleigh", "NC"),
    ("Madison", "WI"),
    ("Boise", "ID"),
];
const STREETS: &[&str] = &["Main St", "Oak Ave", "Pine Rd", "Lake Dr", "Market St", "Elm Way"];
const PAYMENT_TERMS: &[&str] = &["net15", "net30", "net45", "net60", "due_on_receipt"];
const VENDOR_CATEGORIES: &[&str] = &["supplies", "software", "utilities", "services", "rent", "other"];
const EXPENSE_TYPES: &[&str] = &[
    "office supplies", "software", "travel", "meals", "utilities", "rent", "marketing", "insurance",
];
const EXPENSE_TAGS: &[&str] = &["q1", "q2", "q3", "q4", "recurring", "one-off"];
const PAYMENT_METHODS: &[&str] = &["bank_transfer", "credit_card", "check", "cash", "paypal"];
const SERVICES: &[&str] = &[
    "Consulting hours",
    "Website maintenance",
    "Design revisions",
    "Hosting (monthly)",
    "Support retainer",
    "Training session",
    "Data migration",
];
const STATUSES: &[&str] = &["draft", "sent", "paid", "paid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedCounts {
    pub customers: usize,
    pub vendors: usize,
    pub invoices: usize,
    pub expenses: usize,
    pub payments: usize,
}

impl Default for SeedCounts {
    fn default() -> Self {
        Self {
            customers: 20,
            vendors: 15,
            invoices: 50,
            expenses: 80,
            payments: 40,
        }
    }
}

/// What was actually inserted; invoices need customers to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub customers: usize,
    pub vendors: usize,
    pub invoices: usize,
    pub expenses: usize,
    pub payments: usize,
}

fn pick<'a, R: Rng>(rng: &mut R, words: &[&'a str]) -> &'a str {
    words.choose(rng).copied().unwrap_or_default()
}

fn person<R: Rng>(rng: &mut R) -> (String, String) {
    let first = pick(rng, FIRST_NAMES);
    let last = pick(rng, LAST_NAMES);
    (format!("{first} {last}"), format!("{}.{}", first.to_lowercase(), last.to_lowercase()))
}

fn company_name<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, COMPANY_WORDS), pick(rng, COMPANY_SUFFIXES))
}

fn phone<R: Rng>(rng: &mut R) -> String {
    format!(
        "({}) {}-{:04}",
        rng.gen_range(200..999),
        rng.gen_range(200..999),
        rng.gen_range(0..10000)
    )
}

fn address<R: Rng>(rng: &mut R) -> Address {
    let (city, state) = CITIES.choose(rng).copied().unwrap_or(("Austin", "TX"));
    Address {
        street: Some(format!("{} {}", rng.gen_range(10..9999), pick(rng, STREETS))),
        city: Some(city.to_string()),
        state: Some(state.to_string()),
        zip_code: Some(format!("{:05}", rng.gen_range(10000..99999))),
        country: Some("USA".to_string()),
    }
}

fn money<R: Rng>(rng: &mut R, low: f64, high: f64) -> f64 {
    (rng.gen_range(low..high) * 100.0).round() / 100.0
}

fn days_back<R: Rng>(rng: &mut R, today: Date, max: i64) -> Date {
    today - Duration::days(rng.gen_range(0..=max))
}

fn random_customer<R: Rng>(rng: &mut R, n: usize) -> NewCustomer {
    let (name, handle) = person(rng);
    let company = company_name(rng);
    let address = address(rng);
    NewCustomer {
        name,
        email: format!("{handle}{n}@example.com"),
        phone: Some(phone(rng)),
        company: Some(company),
        billing_address: address.clone(),
        address,
        tax_id: rng
            .gen_bool(0.5)
            .then(|| format!("{:02}-{:07}", rng.gen_range(10..99), rng.gen_range(0..10_000_000))),
        payment_terms: if rng.gen_bool(0.6) {
            DEFAULT_PAYMENT_TERMS.to_string()
        } else {
            pick(rng, PAYMENT_TERMS).to_string()
        },
        credit_limit: rng.gen_bool(0.3).then(|| f64::from(rng.gen_range(1..20_i32) * 1000)),
        notes: None,
        is_active: rng.gen_bool(0.9),
    }
}

fn random_vendor<R: Rng>(rng: &mut R, n: usize) -> NewVendor {
    let (contact, handle) = person(rng);
    NewVendor {
        company: company_name(rng),
        contact: Some(contact),
        email: format!("{handle}{n}@vendor.example.com"),
        phone: Some(phone(rng)),
        address: address(rng),
        tax_id: None,
        payment_terms: pick(rng, PAYMENT_TERMS).to_string(),
        category: pick(rng, VENDOR_CATEGORIES).to_string(),
        account_number: rng.gen_bool(0.4).then(|| format!("ACCT-{:06}", rng.gen_range(0..1_000_000))),
        notes: None,
        is_active: true,
    }
}

fn random_invoice<R: Rng>(rng: &mut R, number: String, customer_id: i64, today: Date) -> InvoiceInput {
    let issued = days_back(rng, today, 300);
    let line_items = (0..rng.gen_range(1..=4))
        .map(|_| LineItemInput {
            description: Some(pick(rng, SERVICES).to_string()),
            quantity: Some(f64::from(rng.gen_range(1..=20_i32))),
            rate: Some(money(rng, 25.0, 250.0)),
            tax_rate: None,
        })
        .collect();
    InvoiceInput {
        invoice_number: Some(number),
        customer_id: Some(customer_id),
        status: Some(pick(rng, STATUSES).to_string()),
        issue_date: Some(format_ymd(issued)),
        due_date: Some(format_ymd(issued + Duration::days(30))),
        payment_terms: Some(DEFAULT_PAYMENT_TERMS.to_string()),
        tax_rate: Some(*[0.0, 5.0, 8.25].choose(rng).unwrap_or(&0.0)),
        discount_total: Some(if rng.gen_bool(0.2) { 25.0 } else { 0.0 }),
        line_items,
        ..Default::default()
    }
}

fn next_invoice_number(conn: &Connection, seq: &mut usize, year: i32) -> Result<String, rusqlite::Error> {
    loop {
        *seq += 1;
        let candidate = format!("INV-{year}-{:04}", *seq);
        if !invoices::number_taken(conn, &candidate, None)? {
            return Ok(candidate);
        }
    }
}

/// Inserts `counts` random records in one transaction and reports how many
/// landed. A failure leaves the database untouched.
pub fn seed<R: Rng>(conn: &mut Connection, counts: &SeedCounts, rng: &mut R) -> ApiResult<SeedReport> {
    let tx = conn.transaction()?;
    let report = seed_in(&tx, counts, rng)?;
    tx.commit()?;

    tracing::info!(
        customers = report.customers,
        vendors = report.vendors,
        invoices = report.invoices,
        expenses = report.expenses,
        payments = report.payments,
        "demo data seeded"
    );
    Ok(report)
}

fn seed_in<R: Rng>(conn: &Transaction<'_>, counts: &SeedCounts, rng: &mut R) -> ApiResult<SeedReport> {
    let today = OffsetDateTime::now_utc().date();
    let mut report = SeedReport::default();

    let mut customer_ids = Vec::with_capacity(counts.customers);
    for n in 0..counts.customers {
        customer_ids.push(customers::insert(conn, &random_customer(rng, n))?);
    }
    report.customers = customer_ids.len();

    let mut vendor_ids = Vec::with_capacity(counts.vendors);
    for n in 0..counts.vendors {
        vendor_ids.push(vendors::insert(conn, &random_vendor(rng, n))?);
    }
    report.vendors = vendor_ids.len();

    let mut invoice_ids = Vec::new();
    if !customer_ids.is_empty() {
        let mut seq = 0;
        for _ in 0..counts.invoices {
            let number = next_invoice_number(conn, &mut seq, today.year())?;
            let customer_id = *customer_ids.choose(rng).unwrap_or(&customer_ids[0]);
            let invoice = random_invoice(rng, number, customer_id, today).validate()?;
            invoice_ids.push(invoices::insert_in(conn, &invoice)?);
        }
    }
    report.invoices = invoice_ids.len();

    for _ in 0..counts.expenses {
        let draft = ExpenseDraft {
            kind: pick(rng, EXPENSE_TYPES).to_string(),
            amount: money(rng, 5.0, 1500.0),
            date: format_ymd(days_back(rng, today, 300)),
            payment_method: Some(pick(rng, PAYMENT_METHODS).to_string()),
            reference_number: rng.gen_bool(0.5).then(|| format!("REF-{:05}", rng.gen_range(0..100_000))),
            description: None,
            tax_deductible: rng.gen_bool(0.6),
            tag: rng.gen_bool(0.4).then(|| pick(rng, EXPENSE_TAGS).to_string()),
            vendor_id: if rng.gen_bool(0.7) { vendor_ids.choose(rng).copied() } else { None },
            customer_id: None,
        };
        expenses::insert(conn, &draft)?;
        report.expenses += 1;
    }

    for _ in 0..counts.payments {
        let draft = PaymentDraft {
            amount: money(rng, 50.0, 5000.0),
            date: format_ymd(days_back(rng, today, 200)),
            payment_method: Some(pick(rng, PAYMENT_METHODS).to_string()),
            reference_number: rng.gen_bool(0.5).then(|| format!("PMT-{:05}", rng.gen_range(0..100_000))),
            notes: None,
            invoice_id: if rng.gen_bool(0.6) { invoice_ids.choose(rng).copied() } else { None },
            vendor_id: None,
            customer_id: customer_ids.choose(rng).copied(),
        };
        payments::insert(conn, &draft)?;
        report.payments += 1;
    }

    Ok(report)
}
