use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::{AuthStateMachine, AuthViewState, BearerSessionResolver, ProfileStore};
use crate::config::{AppConfig, Backend};
use crate::database::{MemoryRecordStore, PgRecordStore, RecordStore};
use crate::guard::RouteGuard;
use crate::handlers;
use crate::identity::{GoTrueClient, IdentityProvider, MemoryIdentityProvider};
use crate::middleware::{require_admin, require_session};
use crate::services::{CustomerService, PaymentService, TicketService};
use crate::storage::{FileStorage, HttpStorage, MemoryStorage};

/// Shared collaborators for every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn RecordStore>,
    pub guard: RouteGuard,
    pub tickets: TicketService,
    pub payments: PaymentService,
    pub customers: CustomerService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        let guard = RouteGuard::new(&config.routes);
        let payments = PaymentService::new(store.clone(), storage, config.storage.proof_bucket.clone());

        Self {
            guard,
            tickets: TicketService::new(store.clone()),
            payments,
            customers: CustomerService::new(store.clone()),
            identity,
            store,
            config: Arc::new(config),
        }
    }

    /// Everything in-process: identity, records and files
    pub fn in_memory(config: AppConfig) -> Self {
        let identity = Arc::new(MemoryIdentityProvider::new(&config.identity));
        let storage = Arc::new(MemoryStorage::new(format!("http://localhost:{}", config.server.port)));
        Self::new(config, identity, Arc::new(MemoryRecordStore::new()), storage)
    }

    /// GoTrue identity, Postgres records and REST object storage
    pub async fn remote(config: AppConfig) -> anyhow::Result<Self> {
        let identity = Arc::new(GoTrueClient::new(&config.identity)?);
        let store = Arc::new(PgRecordStore::connect(&config.database).await?);
        let storage = Arc::new(HttpStorage::new(&config.storage, &config.identity)?);
        Ok(Self::new(config, identity, store, storage))
    }

    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        match config.server.backend {
            Backend::Memory => {
                info!("Using in-memory backend");
                Ok(Self::in_memory(config))
            }
            Backend::Remote => {
                info!("Using remote backend at {}", config.identity.url);
                Self::remote(config).await
            }
        }
    }

    pub fn profiles(&self) -> ProfileStore {
        ProfileStore::new(self.store.clone())
    }

    /// One full page load: resolve the bearer token's session and its profile
    pub async fn bootstrap(&self, token: Option<String>) -> AuthViewState {
        let resolver = BearerSessionResolver::new(token, self.identity.clone());
        let machine = AuthStateMachine::new(Arc::new(resolver), self.profiles(), &self.config);
        machine.bootstrap().await
    }
}

pub fn router(state: AppState) -> Router {
    let request_logging = state.config.server.enable_request_logging;

    let app = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(auth_routes())
        .route("/portal", get(handlers::portal::portal_page))
        .route("/portal/*path", get(handlers::portal::portal_page))
        .merge(customer_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .layer(CorsLayer::permissive())
        .with_state(state);

    if request_logging {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    }
}

fn auth_routes() -> Router<AppState> {
    use handlers::auth;

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/logout", post(auth::logout))
}

fn customer_routes(state: AppState) -> Router<AppState> {
    use handlers::{payments, portal, tickets};

    Router::new()
        .route("/api/me", get(portal::me))
        .route("/api/tickets", get(tickets::list_mine).post(tickets::create))
        .route("/api/tickets/events", get(tickets::events_mine))
        .route("/api/payments", get(payments::list_mine).post(payments::submit))
        .route_layer(from_fn_with_state(state, require_session))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    use handlers::{customers, payments, tickets};

    Router::new()
        .route("/api/admin/tickets", get(tickets::list_all))
        .route("/api/admin/tickets/events", get(tickets::events_all))
        .route("/api/admin/tickets/:id", patch(tickets::update_status))
        .route("/api/admin/payments", get(payments::list_all))
        .route("/api/admin/payments/:id", patch(payments::update_status))
        .route("/api/admin/customers", get(customers::list))
        // Layers run bottom-up: session first, then the admin check
        .route_layer(axum::middleware::from_fn(require_admin))
        .route_layer(from_fn_with_state(state, require_session))
}
