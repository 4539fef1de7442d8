use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create quotes table
        manager
            .create_table(
                Table::create()
                    .table(Quotes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Quotes::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Quotes::QuoteNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Quotes::CustomerName).string().not_null())
                    .col(ColumnDef::new(Quotes::CustomerEmail).string().not_null())
                    .col(ColumnDef::new(Quotes::ProjectName).string().not_null())
                    .col(ColumnDef::new(Quotes::ProjectAddress).text().not_null())
                    .col(
                        ColumnDef::new(Quotes::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Quotes::Subtotal)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Quotes::TaxRate)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Quotes::TaxAmount)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Quotes::Total)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Quotes::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(ColumnDef::new(Quotes::DownPaymentPct).decimal().not_null())
                    .col(ColumnDef::new(Quotes::MilestonePct).decimal().not_null())
                    .col(ColumnDef::new(Quotes::FinalPct).decimal().not_null())
                    .col(ColumnDef::new(Quotes::ValidUntil).date_time().not_null())
                    .col(ColumnDef::new(Quotes::Response).string().null())
                    .col(ColumnDef::new(Quotes::ResponseNotes).text().null())
                    .col(ColumnDef::new(Quotes::RespondedAt).timestamp().null())
                    .col(ColumnDef::new(Quotes::FirstViewedAt).timestamp().null())
                    .col(ColumnDef::new(Quotes::LastViewedAt).timestamp().null())
                    .col(ColumnDef::new(Quotes::Notes).text().null())
                    .col(ColumnDef::new(Quotes::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Quotes::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        // Status is the hot filter for admin list views
        manager
            .create_index(
                Index::create()
                    .name("idx_quotes_status")
                    .table(Quotes::Table)
                    .col(Quotes::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Quotes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Quotes {
    Table,
    Id,
    QuoteNumber,
    CustomerName,
    CustomerEmail,
    ProjectName,
    ProjectAddress,
    Status,
    Subtotal,
    TaxRate,
    TaxAmount,
    Total,
    Currency,
    DownPaymentPct,
    MilestonePct,
    FinalPct,
    ValidUntil,
    Response,
    ResponseNotes,
    RespondedAt,
    FirstViewedAt,
    LastViewedAt,
    Notes,
    CreatedAt,
    UpdatedAt,
}
