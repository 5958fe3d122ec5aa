pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod processors;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

use crate::envelope::BankCipher;
use crate::middleware::{auth::admin_auth, request_logger::request_logger_middleware};
use crate::ports::LedgerStore;
use crate::processors::ProcessorRegistry;
use crate::services::{
    CallbackNotifier, CompensationEngine, OrderService, OutcomeApplier, Reconciler,
    SettlementGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub processors: Arc<ProcessorRegistry>,
    pub orders: Arc<OrderService>,
    pub outcomes: Arc<OutcomeApplier>,
    pub gateway: Arc<SettlementGateway>,
    pub reconciler: Arc<Reconciler>,
    pub admin_api_key: String,
}

impl AppState {
    /// Wires the services over one store. Every outcome path shares the same
    /// compensation engine and notifier.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processors: Arc<ProcessorRegistry>,
        cipher: BankCipher,
        notifier: CallbackNotifier,
        admin_api_key: impl Into<String>,
    ) -> Self {
        let compensation = CompensationEngine::new(store.clone(), notifier.clone());
        let outcomes = Arc::new(OutcomeApplier::new(store.clone(), compensation, notifier));
        let orders = Arc::new(OrderService::new(
            store.clone(),
            processors.clone(),
            outcomes.clone(),
        ));
        let gateway = Arc::new(SettlementGateway::new(store.clone(), cipher));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            processors.clone(),
            outcomes.clone(),
        ));

        Self {
            store,
            processors,
            orders,
            outcomes,
            gateway,
            reconciler,
            admin_api_key: admin_api_key.into(),
        }
    }

    /// Sets how long an open order must sit untouched before reconciliation
    /// re-queries it. Should exceed the processor call timeout.
    pub fn with_dispatch_grace(mut self, grace: Duration) -> Self {
        let reconciler = self.reconciler.as_ref().clone().with_dispatch_grace(grace);
        self.reconciler = Arc::new(reconciler);
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/orders/:id/status",
            post(handlers::admin::update_order_status),
        )
        .route("/admin/reconcile", post(handlers::admin::reconcile))
        .route_layer(from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/orders", post(handlers::orders::create_order))
        .route("/api/orders/status", post(handlers::orders::order_status))
        .route("/api/wallet", get(handlers::orders::wallet_balance))
        .route("/bank/inward-credit", post(handlers::bank::inward_credit))
        .route(
            "/callbacks/processors/:name",
            post(handlers::callbacks::processor_callback),
        )
        .merge(admin)
        .layer(from_fn(request_logger_middleware))
        .with_state(state)
}
