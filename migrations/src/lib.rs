pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_quotes_table;
mod m20250601_000002_create_quote_line_items_table;
mod m20250601_000003_create_projects_table;
mod m20250601_000004_create_invoices_table;
mod m20250601_000005_create_payment_records_table;
mod m20250601_000006_create_access_tokens_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_quotes_table::Migration),
            Box::new(m20250601_000002_create_quote_line_items_table::Migration),
            Box::new(m20250601_000003_create_projects_table::Migration),
            Box::new(m20250601_000004_create_invoices_table::Migration),
            Box::new(m20250601_000005_create_payment_records_table::Migration),
            Box::new(m20250601_000006_create_access_tokens_table::Migration),
        ]
    }
}
