use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Quote events
    QuoteCreated(Uuid),
    QuoteSent(Uuid),
    QuoteViewed(Uuid),
    QuoteResponded {
        quote_id: Uuid,
        response: String,
    },

    // Acceptance events
    ProjectCreated {
        project_id: Uuid,
        quote_id: Uuid,
    },
    InvoiceIssued {
        invoice_id: Uuid,
        project_id: Uuid,
    },
    PaymentIntentRequested {
        invoice_id: Uuid,
        intent_id: String,
    },

    // Reconciliation events
    PaymentRecorded {
        invoice_id: Uuid,
        external_intent_id: String,
    },
    InvoicePaid(Uuid),
    WelcomeNotificationQueued {
        project_id: Uuid,
    },
}

// Function to process incoming events. Side effects live in the services; this
// loop is the audit trail of what the pipeline did.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::QuoteCreated(quote_id) => {
                info!("Quote created: {}", quote_id);
            }
            Event::QuoteSent(quote_id) => {
                info!("Quote sent to client: {}", quote_id);
            }
            Event::QuoteViewed(quote_id) => {
                info!("Quote viewed for the first time: {}", quote_id);
            }
            Event::QuoteResponded { quote_id, response } => {
                info!("Quote {} received response: {}", quote_id, response);
            }
            Event::ProjectCreated {
                project_id,
                quote_id,
            } => {
                info!(
                    "Project {} created from accepted quote {}",
                    project_id, quote_id
                );
            }
            Event::InvoiceIssued {
                invoice_id,
                project_id,
            } => {
                info!("Invoice {} issued for project {}", invoice_id, project_id);
            }
            Event::PaymentIntentRequested {
                invoice_id,
                intent_id,
            } => {
                info!(
                    "Payment intent {} registered for invoice {}",
                    intent_id, invoice_id
                );
            }
            Event::PaymentRecorded {
                invoice_id,
                external_intent_id,
            } => {
                info!(
                    "Payment {} recorded against invoice {}",
                    external_intent_id, invoice_id
                );
            }
            Event::InvoicePaid(invoice_id) => {
                info!("Invoice paid in full: {}", invoice_id);
            }
            Event::WelcomeNotificationQueued { project_id } => {
                info!("Welcome notification queued for project {}", project_id);
            }
        }
    }

    warn!("Event processing loop has ended");
}
