// Quote-to-cash pipeline
pub mod acceptance;
pub mod quotes;
pub mod reconciliation;
pub mod tokens;

// Read side
pub mod projects;

// Outbound side effects
pub mod notifications;
