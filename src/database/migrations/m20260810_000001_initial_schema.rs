use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create tables in order of dependencies
        self.create_raw_file_table(manager).await?;
        self.create_raw_row_table(manager).await?;
        self.create_product_history_table(manager).await?;
        self.create_product_history_file_table(manager).await?;
        self.create_product_latest_table(manager).await?;
        self.create_product_audit_table(manager).await?;
        self.create_format_history_table(manager).await?;
        self.create_production_sync_table(manager).await?;
        self.create_pipeline_logs_table(manager).await?;

        self.create_indexes(manager).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order
        manager
            .drop_table(Table::drop().table(PipelineLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductionSync::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FormatHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductAudit::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductLatest::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductHistoryFile::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RawRow::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RawFile::Table).to_owned())
            .await?;

        Ok(())
    }
}

impl Migration {
    async fn create_raw_file_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RawFile::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawFile::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RawFile::FileName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(RawFile::FileDate).date().not_null())
                    .col(ColumnDef::new(RawFile::RowCount).integer())
                    .col(
                        ColumnDef::new(RawFile::ImportedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_raw_row_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RawRow::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawRow::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RawRow::FileId).big_integer().not_null())
                    .col(ColumnDef::new(RawRow::RowData).json().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_raw_row_file")
                            .from(RawRow::Table, RawRow::FileId)
                            .to(RawFile::Table, RawFile::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_product_history_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductHistory::ProductNumber)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductHistory::AlternateNumber).string())
                    .col(
                        ColumnDef::new(ProductHistory::RawFileId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductHistory::FileDate).date().not_null())
                    .col(
                        ColumnDef::new(ProductHistory::SourceModifiedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(ProductHistory::Payload).json().not_null())
                    .col(
                        ColumnDef::new(ProductHistory::ContentHash)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductHistory::IsCurrent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProductHistory::ImportedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_history_raw_file")
                            .from(ProductHistory::Table, ProductHistory::RawFileId)
                            .to(RawFile::Table, RawFile::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_product_history_file_table(
        &self,
        manager: &SchemaManager<'_>,
    ) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductHistoryFile::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductHistoryFile::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductHistoryFile::FileName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ProductHistoryFile::FileDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductHistoryFile::ProcessedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_product_latest_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductLatest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductLatest::ProductNumber)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductLatest::AlternateNumber).string())
                    .col(ColumnDef::new(ProductLatest::FileDate).date().not_null())
                    .col(ColumnDef::new(ProductLatest::Payload).json().not_null())
                    .col(
                        ColumnDef::new(ProductLatest::ContentHash)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductLatest::RefreshedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_product_audit_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductAudit::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductAudit::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductAudit::ProductNumber)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductAudit::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductAudit::Actor).string().not_null())
                    .col(ColumnDef::new(ProductAudit::Action).string().not_null())
                    .col(ColumnDef::new(ProductAudit::Details).text())
                    .col(ColumnDef::new(ProductAudit::SourceFile).string())
                    .col(ColumnDef::new(ProductAudit::ExecutionTimeMs).big_integer())
                    .col(ColumnDef::new(ProductAudit::Context).json())
                    .to_owned(),
            )
            .await
    }

    async fn create_format_history_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FormatHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FormatHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FormatHistory::ProductNumber)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FormatHistory::FormatName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FormatHistory::FilePath).text())
                    .col(ColumnDef::new(FormatHistory::FileSizeBytes).big_integer())
                    .col(
                        ColumnDef::new(FormatHistory::GeneratedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_production_sync_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductionSync::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductionSync::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductionSync::ProductNumber)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionSync::FilesSynced)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionSync::TotalBytes)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionSync::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_pipeline_logs_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PipelineLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PipelineLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PipelineLogs::RunId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(PipelineLogs::Pipeline).string().not_null())
                    .col(
                        ColumnDef::new(PipelineLogs::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PipelineLogs::FinishedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PipelineLogs::Total).big_integer().not_null())
                    .col(
                        ColumnDef::new(PipelineLogs::Successful)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PipelineLogs::Failed)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PipelineLogs::Skipped)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PipelineLogs::DurationMs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PipelineLogs::Status).string().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn create_indexes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_product_history_number_date")
                    .table(ProductHistory::Table)
                    .col(ProductHistory::ProductNumber)
                    .col(ProductHistory::FileDate)
                    .unique()
                    .to_owned(),
            )
            .await?;
        // At most one current row per product, enforced by the database so
        // racing writers collide instead of both committing a pointer.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_product_history_current")
                    .table(ProductHistory::Table)
                    .col(ProductHistory::ProductNumber)
                    .unique()
                    .and_where(Expr::col(ProductHistory::IsCurrent).eq(true))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_product_audit_number_timestamp")
                    .table(ProductAudit::Table)
                    .col(ProductAudit::ProductNumber)
                    .col(ProductAudit::Timestamp)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_product_audit_action")
                    .table(ProductAudit::Table)
                    .col(ProductAudit::Action)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_format_history_number")
                    .table(FormatHistory::Table)
                    .col(FormatHistory::ProductNumber)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_production_sync_number")
                    .table(ProductionSync::Table)
                    .col(ProductionSync::ProductNumber)
                    .col(ProductionSync::SyncedAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pipeline_logs_pipeline")
                    .table(PipelineLogs::Table)
                    .col(PipelineLogs::Pipeline)
                    .col(PipelineLogs::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RawFile {
    Table,
    Id,
    FileName,
    FileDate,
    RowCount,
    ImportedAt,
}

#[derive(DeriveIden)]
enum RawRow {
    Table,
    Id,
    FileId,
    RowData,
}

#[derive(DeriveIden)]
enum ProductHistory {
    Table,
    Id,
    ProductNumber,
    AlternateNumber,
    RawFileId,
    FileDate,
    SourceModifiedAt,
    Payload,
    ContentHash,
    IsCurrent,
    ImportedAt,
}

#[derive(DeriveIden)]
enum ProductHistoryFile {
    Table,
    Id,
    FileName,
    FileDate,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum ProductLatest {
    Table,
    ProductNumber,
    AlternateNumber,
    FileDate,
    Payload,
    ContentHash,
    RefreshedAt,
}

#[derive(DeriveIden)]
enum ProductAudit {
    Table,
    Id,
    ProductNumber,
    Timestamp,
    Actor,
    Action,
    Details,
    SourceFile,
    ExecutionTimeMs,
    Context,
}

#[derive(DeriveIden)]
enum FormatHistory {
    Table,
    Id,
    ProductNumber,
    FormatName,
    FilePath,
    FileSizeBytes,
    GeneratedAt,
}

#[derive(DeriveIden)]
enum ProductionSync {
    Table,
    Id,
    ProductNumber,
    FilesSynced,
    TotalBytes,
    SyncedAt,
}

#[derive(DeriveIden)]
enum PipelineLogs {
    Table,
    Id,
    RunId,
    Pipeline,
    StartedAt,
    FinishedAt,
    Total,
    Successful,
    Failed,
    Skipped,
    DurationMs,
    Status,
}
