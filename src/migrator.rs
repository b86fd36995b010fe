use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_stock_items_table::Migration),
            Box::new(m20240601_000002_create_transfer_requests_table::Migration),
            Box::new(m20240601_000003_create_transfer_history_table::Migration),
        ]
    }
}

mod m20240601_000001_create_stock_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_stock_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockItems::Location).string_len(8).not_null())
                        .col(ColumnDef::new(StockItems::PartNumber).string().not_null())
                        .col(ColumnDef::new(StockItems::Name).string().not_null())
                        .col(ColumnDef::new(StockItems::Brand).string().null())
                        .col(ColumnDef::new(StockItems::Application).string().null())
                        .col(
                            ColumnDef::new(StockItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockItems::ShelfCode).string().null())
                        .col(
                            ColumnDef::new(StockItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One ledger row per (location, part number)
            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_items_location_part")
                        .table(StockItems::Table)
                        .col(StockItems::Location)
                        .col(StockItems::PartNumber)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockItems {
        Table,
        Id,
        Location,
        PartNumber,
        Name,
        Brand,
        Application,
        Quantity,
        ShelfCode,
        UpdatedAt,
    }
}

mod m20240601_000002_create_transfer_requests_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_transfer_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TransferRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransferRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::FromLocation)
                                .string_len(8)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::ToLocation)
                                .string_len(8)
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferRequests::PartNumber).string().not_null())
                        .col(ColumnDef::new(TransferRequests::DisplayName).string().not_null())
                        .col(ColumnDef::new(TransferRequests::Brand).string().null())
                        .col(ColumnDef::new(TransferRequests::Application).string().null())
                        .col(
                            ColumnDef::new(TransferRequests::RequestedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferRequests::ApprovedQuantity).integer().null())
                        .col(ColumnDef::new(TransferRequests::SentQuantity).integer().null())
                        .col(
                            ColumnDef::new(TransferRequests::CompensatedQuantity)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(TransferRequests::Note).text().null())
                        .col(ColumnDef::new(TransferRequests::RejectReason).text().null())
                        .col(
                            ColumnDef::new(TransferRequests::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferRequests::RequestedBy).string().not_null())
                        .col(ColumnDef::new(TransferRequests::ApprovedBy).string().null())
                        .col(ColumnDef::new(TransferRequests::SentBy).string().null())
                        .col(ColumnDef::new(TransferRequests::ReceivedBy).string().null())
                        .col(ColumnDef::new(TransferRequests::RejectedBy).string().null())
                        .col(
                            ColumnDef::new(TransferRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::SentAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::RejectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransferRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .check(
                            Expr::col(TransferRequests::FromLocation)
                                .ne(Expr::col(TransferRequests::ToLocation)),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_transfer_requests_status", TransferRequests::Status),
                ("idx_transfer_requests_from", TransferRequests::FromLocation),
                ("idx_transfer_requests_to", TransferRequests::ToLocation),
                ("idx_transfer_requests_part", TransferRequests::PartNumber),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .name(name)
                            .table(TransferRequests::Table)
                            .col(column)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransferRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TransferRequests {
        Table,
        Id,
        FromLocation,
        ToLocation,
        PartNumber,
        DisplayName,
        Brand,
        Application,
        RequestedQuantity,
        ApprovedQuantity,
        SentQuantity,
        CompensatedQuantity,
        Note,
        RejectReason,
        Status,
        RequestedBy,
        ApprovedBy,
        SentBy,
        ReceivedBy,
        RejectedBy,
        CreatedAt,
        ApprovedAt,
        SentAt,
        ReceivedAt,
        RejectedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_transfer_history_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_transfer_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // No foreign key: history outlives hard-deleted pending requests
            manager
                .create_table(
                    Table::create()
                        .table(TransferHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransferHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferHistory::TransferId).uuid().not_null())
                        .col(ColumnDef::new(TransferHistory::Action).string_len(32).not_null())
                        .col(ColumnDef::new(TransferHistory::FromStatus).string_len(16).null())
                        .col(ColumnDef::new(TransferHistory::ToStatus).string_len(16).null())
                        .col(ColumnDef::new(TransferHistory::Actor).string().not_null())
                        .col(ColumnDef::new(TransferHistory::Location).string_len(8).not_null())
                        .col(ColumnDef::new(TransferHistory::Quantity).integer().null())
                        .col(ColumnDef::new(TransferHistory::Detail).text().null())
                        .col(
                            ColumnDef::new(TransferHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_transfer_history_transfer_id")
                        .table(TransferHistory::Table)
                        .col(TransferHistory::TransferId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransferHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TransferHistory {
        Table,
        Id,
        TransferId,
        Action,
        FromStatus,
        ToStatus,
        Actor,
        Location,
        Quantity,
        Detail,
        CreatedAt,
    }
}
