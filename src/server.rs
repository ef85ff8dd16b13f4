//! HTTP surface: route table and the listener loop.

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::Db;
use crate::{company, customers, dashboard, expenses, health, invoices, payments, reports, settings, vendors};

pub fn build_router(db: Db) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/api/customers/{id}",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route("/api/vendors", get(vendors::list_vendors).post(vendors::create_vendor))
        .route(
            "/api/vendors/{id}",
            get(vendors::get_vendor)
                .put(vendors::update_vendor)
                .delete(vendors::delete_vendor),
        )
        .route(
            "/api/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/api/invoices/{id}",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route(
            "/api/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route(
            "/api/expenses/{id}",
            get(expenses::get_expense)
                .put(expenses::update_expense)
                .delete(expenses::delete_expense),
        )
        .route(
            "/api/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/api/payments/summary", get(payments::payment_summary))
        .route(
            "/api/payments/{id}",
            get(payments::get_payment)
                .put(payments::update_payment)
                .delete(payments::delete_payment),
        )
        .route("/api/company", get(company::get_company).post(company::save_company))
        .route(
            "/api/tax-settings",
            get(settings::get_tax_settings).post(settings::save_tax_settings),
        )
        .route(
            "/api/notification-settings",
            get(settings::get_notification_settings).post(settings::save_notification_settings),
        )
        .route("/api/dashboard", get(dashboard::get_dashboard))
        .route("/api/reports/profit-loss", get(reports::get_profit_loss))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(db)
}

/// Serves `router` on an already bound listener until ctrl-c.
pub async fn serve_on(listener: TcpListener, router: Router) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub async fn serve(config: &AppConfig, db: Db) -> anyhow::Result<()> {
    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        env = %config.environment,
        "ledgerflow api listening"
    );
    serve_on(listener, build_router(db)).await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
