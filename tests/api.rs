use std::net::SocketAddr;

use ledgerflow::build_router;
use ledgerflow::config::DatabaseLocation;
use ledgerflow::db::Db;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestApp {
    base: String,
    http: Client,
    _dir: TempDir,
}

impl TestApp {
    async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db = Db::open(&DatabaseLocation::File(dir.path().join("ledgerflow.db"))).expect("open db");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr: SocketAddr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, build_router(db)).await.expect("serve");
        });
        Self {
            base: format!("http://{addr}"),
            http: Client::new(),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.http.get(self.url(path)).send().await.expect("GET");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.http.post(self.url(path)).json(&body).send().await.expect("POST");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.http.put(self.url(path)).json(&body).send().await.expect("PUT");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let res = self.http.delete(self.url(path)).send().await.expect("DELETE");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn customer(&self, name: &str, email: &str) -> i64 {
        let (status, body) = self
            .post("/api/customers", json!({"name": name, "email": email}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().expect("customer id")
    }
}

#[tokio::test]
async fn health_reports_service() {
    let app = TestApp::spawn().await;
    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "LedgerFlow Backend");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn customer_lifecycle() {
    let app = TestApp::spawn().await;

    let (status, body) = app.post("/api/customers", json!({"name": "  ", "email": "x@y.io"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name and email are required");

    let (status, body) = app
        .post("/api/customers", json!({"name": "Ana", "email": "not-an-email"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email address");

    let id = app.customer("Ana Hart", "ana@hart.io").await;
    let (status, body) = app.get(&format!("/api/customers/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ana Hart");
    assert_eq!(body["paymentTerms"], "net30");
    assert_eq!(body["isActive"], true);

    let (status, body) = app
        .put(
            &format!("/api/customers/{id}"),
            json!({"name": "Ana H.", "email": "ana@hart.io", "company": "Hart LLC"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "id": id}));

    let (status, body) = app.put("/api/customers/9999", json!({"name": "X", "email": "x@y.io"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Customer not found");

    let (status, _) = app.delete(&format!("/api/customers/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/customers/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn customer_with_invoices_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let id = app.customer("Busy", "busy@co.io").await;
    let (status, _) = app
        .post("/api/invoices", json!({"invoiceNumber": "INV-1", "customerId": id}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.delete(&format!("/api/customers/{id}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Customer has invoices and cannot be deleted");
}

#[tokio::test]
async fn invoice_totals_and_uniqueness() {
    let app = TestApp::spawn().await;
    let customer_id = app.customer("Globex", "ap@globex.com").await;

    let (status, invoice) = app
        .post(
            "/api/invoices",
            json!({
                "invoiceNumber": " INV-100 ",
                "customerId": customer_id.to_string(),
                "status": "OVERDUE",
                "taxRate": 10,
                "lineItems": [
                    {"description": "Design", "quantity": 10, "rate": 100},
                    {"description": "Build", "quantity": "5", "rate": "100"},
                    {"description": "   ", "quantity": 1, "rate": 999}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(invoice["invoiceNumber"], "INV-100");
    assert_eq!(invoice["status"], "sent");
    assert_eq!(invoice["subtotal"], 1500.0);
    assert_eq!(invoice["taxTotal"], 150.0);
    assert_eq!(invoice["total"], 1650.0);
    assert_eq!(invoice["lineItems"].as_array().map(Vec::len), Some(2));
    assert_eq!(invoice["customer"]["name"], "Globex");

    let (status, body) = app
        .post("/api/invoices", json!({"invoiceNumber": "INV-100", "customerId": customer_id}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invoice number must be unique");

    let (status, body) = app
        .post("/api/invoices", json!({"invoiceNumber": "INV-101", "customerId": 4242}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Customer not found");

    let (status, body) = app.post("/api/invoices", json!({"customerId": customer_id})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invoice number and customer are required");

    let id = invoice["id"].as_i64().expect("invoice id");
    let (status, updated) = app
        .put(
            &format!("/api/invoices/{id}"),
            json!({
                "invoiceNumber": "INV-100",
                "customerId": customer_id,
                "status": "paid",
                "discountTotal": 50,
                "lineItems": [{"description": "Retainer", "quantity": 1, "rate": 500}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["total"], 450.0);
    assert_eq!(updated["lineItems"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.delete(&format!("/api/invoices/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get(&format!("/api/invoices/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invoice not found");
}

#[tokio::test]
async fn list_queries_search_sort_and_paginate() {
    let app = TestApp::spawn().await;
    for (name, email) in [
        ("Charlie", "c@x.io"),
        ("alpha", "a@x.io"),
        ("Bravo", "b@x.io"),
        ("Delta", "d@x.io"),
        ("Echo", "e@x.io"),
    ] {
        app.customer(name, email).await;
    }

    let (status, body) = app.get("/api/customers").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .expect("plain array without page")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["alpha", "Bravo", "Charlie", "Delta", "Echo"]);

    let (_, body) = app.get("/api/customers?sort=name&dir=desc&page=2&pageSize=2").await;
    assert_eq!(body["totalItems"], 5);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["currentPage"], 2);
    assert_eq!(body["startItem"], 3);
    assert_eq!(body["endItem"], 4);
    assert_eq!(body["items"][0]["name"], "Charlie");

    let (_, body) = app.get("/api/customers?page=99&pageSize=2").await;
    assert_eq!(body["currentPage"], 3);
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));

    let (_, body) = app.get("/api/customers?search=ALP").await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = app.get("/api/customers?sort=shoeSize").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown sort column: shoeSize");

    let (_, body) = app.get("/api/invoices?page=1").await;
    assert_eq!(body["totalItems"], 0);
    assert_eq!(body["totalPages"], 1);
    assert_eq!(body["startItem"], 0);
}

#[tokio::test]
async fn expenses_validate_and_patch() {
    let app = TestApp::spawn().await;

    let (status, body) = app.post("/api/expenses", json!({"type": "rent", "date": "2024-01-01"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Type, amount and date are required");

    let (status, body) = app
        .post("/api/expenses", json!({"type": "rent", "amount": 0, "date": "2024-01-01"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Amount must be greater than zero");

    let (status, body) = app
        .post(
            "/api/expenses",
            json!({"type": "rent", "amount": 100, "date": "2024-01-01", "vendorId": 77}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Vendor not found");

    let (status, vendor) = app
        .post("/api/vendors", json!({"company": "Landlord Co", "email": "rent@landlord.io"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let vendor_id = vendor["id"].as_i64().expect("vendor id");

    let (status, expense) = app
        .post(
            "/api/expenses",
            json!({
                "type": "rent",
                "amount": "1200.50",
                "date": "2024-01-01",
                "vendorId": vendor_id.to_string(),
                "tag": " q1 "
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{expense}");
    assert_eq!(expense["amount"], 1200.5);
    assert_eq!(expense["tag"], "q1");
    assert_eq!(expense["vendor"]["name"], "Landlord Co");

    let id = expense["id"].as_i64().expect("expense id");
    let (status, patched) = app
        .put(&format!("/api/expenses/{id}"), json!({"amount": 900, "vendorId": ""}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["amount"], 900.0);
    assert_eq!(patched["type"], "rent");
    assert_eq!(patched["vendor"], Value::Null);

    let (status, body) = app.put(&format!("/api/expenses/{id}"), json!({"type": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Expense type is required");

    let (_, body) = app.get("/api/expenses?tag=Q1").await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn payment_summary_counts_links() {
    let app = TestApp::spawn().await;
    let customer_id = app.customer("Payer", "payer@co.io").await;
    let (_, invoice) = app
        .post("/api/invoices", json!({"invoiceNumber": "INV-9", "customerId": customer_id}))
        .await;
    let invoice_id = invoice["id"].as_i64().expect("invoice id");

    let (status, body) = app.post("/api/payments", json!({"amount": 10})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Amount and date are required");

    let (status, body) = app
        .post("/api/payments", json!({"amount": 10, "date": "2024-01-01", "invoiceId": 999}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invoice not found");

    let (status, linked) = app
        .post(
            "/api/payments",
            json!({"amount": 100.255, "date": "2020-03-01", "invoiceId": invoice_id}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{linked}");
    assert_eq!(linked["invoice"]["invoiceNumber"], "INV-9");
    assert_eq!(linked["invoice"]["customerName"], "Payer");

    let (status, _) = app
        .post("/api/payments", json!({"amount": 50, "date": "2020-04-02", "invoiceId": "null"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, summary) = app.get("/api/payments/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["count"], 2);
    assert_eq!(summary["linkedToInvoices"], 1);
    assert_eq!(summary["currentMonthTotal"], 0.0);

    app.delete(&format!("/api/invoices/{invoice_id}")).await;
    let id = linked["id"].as_i64().expect("payment id");
    let (_, payment) = app.get(&format!("/api/payments/{id}")).await;
    assert_eq!(payment["invoiceId"], Value::Null);
}

#[tokio::test]
async fn settings_round_trip() {
    let app = TestApp::spawn().await;
    let (status, body) = app.get("/api/company").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let (status, _) = app
        .post("/api/company", json!({"companyName": "Ledger LLC", "mailing": {"city": "Boise"}}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, company) = app.get("/api/company").await;
    assert_eq!(company["name"], "Ledger LLC");
    assert_eq!(company["mailing"]["city"], "Boise");

    let (status, _) = app
        .post(
            "/api/tax-settings",
            json!({"defaultTaxRate": 7, "rates": [{"name": "State", "rate": 6}, {"name": "", "rate": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, tax) = app.get("/api/tax-settings").await;
    assert_eq!(tax["org"]["entityType"], "llc");
    assert_eq!(tax["rates"].as_array().map(Vec::len), Some(1));

    let (status, body) = app
        .post("/api/notification-settings", json!({"enableSms": true, "phoneNumber": "12"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid phone number");
}

#[tokio::test]
async fn dashboard_and_profit_loss() {
    let app = TestApp::spawn().await;
    let customer_id = app.customer("Client", "client@co.io").await;
    app.post(
        "/api/invoices",
        json!({
            "invoiceNumber": "P-1",
            "customerId": customer_id,
            "status": "paid",
            "issueDate": "2024-01-15",
            "lineItems": [{"description": "Work", "quantity": 2, "rate": 500}]
        }),
    )
    .await;
    app.post(
        "/api/invoices",
        json!({
            "invoiceNumber": "S-1",
            "customerId": customer_id,
            "status": "sent",
            "issueDate": "2024-01-20",
            "lineItems": [{"description": "Work", "quantity": 1, "rate": 300}]
        }),
    )
    .await;
    app.post("/api/expenses", json!({"type": "software", "amount": 120, "date": "2024-01-10"}))
        .await;
    app.post("/api/expenses", json!({"type": "rent", "amount": 400, "date": "2024-02-01"}))
        .await;

    let (status, dash) = app.get("/api/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dash["metrics"]["totalRevenue"]["amount"], 1000.0);
    assert_eq!(dash["metrics"]["totalExpenses"]["amount"], 520.0);
    assert_eq!(dash["metrics"]["outstandingInvoices"]["amount"], 300.0);
    assert_eq!(dash["metrics"]["outstandingInvoices"]["count"], 1);
    assert_eq!(dash["metrics"]["netProfit"]["amount"], 480.0);
    assert_eq!(dash["revenueTrend"].as_array().map(Vec::len), Some(6));
    assert_eq!(dash["recentInvoices"][0]["invoiceNumber"], "S-1");
    assert_eq!(dash["recentInvoices"][0]["customerName"], "Client");

    let (status, report) = app
        .get("/api/reports/profit-loss?from=2024-01-01&to=2024-01-31")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["income"]["total"], 1000.0);
    assert_eq!(report["income"]["invoiceCount"], 1);
    assert_eq!(report["expenses"]["total"], 120.0);
    assert_eq!(report["expenses"]["byType"][0]["type"], "software");
    assert_eq!(report["netProfit"], 880.0);

    let (status, body) = app
        .get("/api/reports/profit-loss?from=2024-02-01&to=2024-01-01")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "from must not be after to");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let res = app
        .http
        .post(app.url("/api/customers"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("POST");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.expect("json body");
    assert!(body["error"].as_str().is_some());
}
