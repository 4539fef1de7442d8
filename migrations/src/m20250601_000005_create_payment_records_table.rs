use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create payment_records table
        manager
            .create_table(
                Table::create()
                    .table(PaymentRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentRecords::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentRecords::InvoiceId).uuid().not_null())
                    .col(
                        ColumnDef::new(PaymentRecords::ExternalIntentId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentRecords::Amount).decimal().not_null())
                    .col(
                        ColumnDef::new(PaymentRecords::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(ColumnDef::new(PaymentRecords::Method).string().null())
                    .col(
                        ColumnDef::new(PaymentRecords::ReceivedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_records_invoice_id")
                            .from(PaymentRecords::Table, PaymentRecords::InvoiceId)
                            .to(
                                super::m20250601_000004_create_invoices_table::Invoices::Table,
                                super::m20250601_000004_create_invoices_table::Invoices::Id,
                            )
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Dedup anchor for webhook deliveries; violating this index IS the
        // duplicate signal, there is no pre-check
        manager
            .create_index(
                Index::create()
                    .name("idx_payment_records_external_intent_id")
                    .table(PaymentRecords::Table)
                    .col(PaymentRecords::ExternalIntentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_records_invoice_id")
                    .table(PaymentRecords::Table)
                    .col(PaymentRecords::InvoiceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PaymentRecords {
    Table,
    Id,
    InvoiceId,
    ExternalIntentId,
    Amount,
    Currency,
    Method,
    ReceivedAt,
    CreatedAt,
}
