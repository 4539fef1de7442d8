pub mod common;
pub mod payment_webhooks;
pub mod projects;
pub mod quotes;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::acceptance::AcceptanceService;
use crate::services::notifications::NotificationSender;
use crate::services::projects::ProjectService;
use crate::services::quotes::QuoteService;
use crate::services::reconciliation::ReconciliationService;
use crate::services::tokens::TokenService;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub quotes: Arc<QuoteService>,
    pub acceptance: Arc<AcceptanceService>,
    pub projects: Arc<ProjectService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    /// Wires every service against shared infrastructure. The gateway and
    /// notifier come in as trait objects so tests can substitute fakes.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSender>,
        config: &AppConfig,
    ) -> Self {
        let tokens = TokenService::new(db_pool.clone());
        let acceptance = AcceptanceService::new(
            db_pool.clone(),
            gateway,
            event_sender.clone(),
            config.default_invoice_due_days,
        );
        let quotes = QuoteService::new(
            db_pool.clone(),
            tokens,
            acceptance.clone(),
            event_sender.clone(),
            config,
        );
        let projects = ProjectService::new(db_pool.clone());
        let reconciliation = ReconciliationService::new(db_pool, notifier, event_sender);

        Self {
            quotes: Arc::new(quotes),
            acceptance: Arc::new(acceptance),
            projects: Arc::new(projects),
            reconciliation: Arc::new(reconciliation),
        }
    }
}
