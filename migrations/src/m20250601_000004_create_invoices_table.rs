use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create invoices table
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Invoices::InvoiceNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Invoices::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Invoices::QuoteId).uuid().not_null())
                    .col(ColumnDef::new(Invoices::PaymentType).string().not_null())
                    .col(ColumnDef::new(Invoices::Amount).decimal().not_null())
                    .col(
                        ColumnDef::new(Invoices::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Invoices::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Invoices::DueDate).date_time().not_null())
                    .col(ColumnDef::new(Invoices::PaymentIntentId).string().null())
                    .col(ColumnDef::new(Invoices::PaidAt).timestamp().null())
                    .col(ColumnDef::new(Invoices::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Invoices::UpdatedAt).timestamp().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoices_project_id")
                            .from(Invoices::Table, Invoices::ProjectId)
                            .to(
                                super::m20250601_000003_create_projects_table::Projects::Table,
                                super::m20250601_000003_create_projects_table::Projects::Id,
                            )
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_project_id")
                    .table(Invoices::Table)
                    .col(Invoices::ProjectId)
                    .to_owned(),
            )
            .await?;

        // Webhook diagnostics look invoices up by intent
        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_payment_intent_id")
                    .table(Invoices::Table)
                    .col(Invoices::PaymentIntentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Invoices {
    Table,
    Id,
    InvoiceNumber,
    ProjectId,
    QuoteId,
    PaymentType,
    Amount,
    Currency,
    Status,
    DueDate,
    PaymentIntentId,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}
