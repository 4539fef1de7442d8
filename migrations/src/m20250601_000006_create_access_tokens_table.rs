use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create access_tokens table; only the SHA-256 hash of a token is
        // ever stored
        manager
            .create_table(
                Table::create()
                    .table(AccessTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessTokens::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AccessTokens::TokenHash).string().not_null())
                    .col(ColumnDef::new(AccessTokens::Kind).string().not_null())
                    .col(ColumnDef::new(AccessTokens::SubjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(AccessTokens::ExpiresAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AccessTokens::ConsumedAt).timestamp().null())
                    .col(
                        ColumnDef::new(AccessTokens::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_access_tokens_token_hash")
                    .table(AccessTokens::Table)
                    .col(AccessTokens::TokenHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Issuing a fresh token retires prior live ones for the subject
        manager
            .create_index(
                Index::create()
                    .name("idx_access_tokens_kind_subject")
                    .table(AccessTokens::Table)
                    .col(AccessTokens::Kind)
                    .col(AccessTokens::SubjectId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AccessTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AccessTokens {
    Table,
    Id,
    TokenHash,
    Kind,
    SubjectId,
    ExpiresAt,
    ConsumedAt,
    CreatedAt,
}
