use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_cart_lines_table::Migration),
            Box::new(m20240601_000003_create_orders_tables::Migration),
            Box::new(m20240601_000004_create_promo_codes_table::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    fn product_table<T: Iden + Copy + 'static>(table: T) -> TableCreateStatement {
        Table::create()
            .table(table)
            .if_not_exists()
            .col(ColumnDef::new(Product::Id).uuid().not_null().primary_key())
            .col(ColumnDef::new(Product::Title).string().not_null())
            .col(ColumnDef::new(Product::Price).decimal_len(10, 2).not_null())
            .col(ColumnDef::new(Product::DiscountPrice).decimal_len(10, 2).null())
            .col(
                ColumnDef::new(Product::StockQuantity)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(Product::InStock)
                    .boolean()
                    .not_null()
                    .default(true),
            )
            .col(
                ColumnDef::new(Product::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Product::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .check(Expr::col(Product::StockQuantity).gte(0))
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager.create_table(product_table(Games::Table)).await?;
            manager
                .create_table(product_table(PaymentCards::Table))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentCards::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Games::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Games {
        Table,
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum PaymentCards {
        Table,
    }

    /// Columns shared by both catalog tables.
    #[derive(DeriveIden)]
    pub(super) enum Product {
        Id,
        Title,
        Price,
        DiscountPrice,
        StockQuantity,
        InStock,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_cart_lines_table {
    use super::m20240601_000001_create_catalog_tables::{Games, PaymentCards, Product};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_cart_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartLines::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartLines::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(CartLines::UserId).string().not_null())
                        .col(ColumnDef::new(CartLines::GameId).uuid().null())
                        .col(ColumnDef::new(CartLines::PaymentCardId).uuid().null())
                        .col(ColumnDef::new(CartLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .check(Expr::cust(
                            "(game_id IS NOT NULL AND payment_card_id IS NULL) OR (game_id IS NULL AND payment_card_id IS NOT NULL)",
                        ))
                        .check(Expr::col(CartLines::Quantity).between(1, 99))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_lines_game_id")
                                .from(CartLines::Table, CartLines::GameId)
                                .to(Games::Table, Product::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_lines_payment_card_id")
                                .from(CartLines::Table, CartLines::PaymentCardId)
                                .to(PaymentCards::Table, Product::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Conflict targets for the insert-or-increment upsert
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_cart_lines_user_game")
                        .table(CartLines::Table)
                        .col(CartLines::UserId)
                        .col(CartLines::GameId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_cart_lines_user_payment_card")
                        .table(CartLines::Table)
                        .col(CartLines::UserId)
                        .col(CartLines::PaymentCardId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CartLines {
        Table,
        Id,
        UserId,
        GameId,
        PaymentCardId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Orders::UserId).string().not_null())
                        .col(ColumnDef::new(Orders::Total).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::ExternalSessionId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            // Product ids are not foreign keys here: an order outlives catalog rows.
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::GameId).uuid().null())
                        .col(ColumnDef::new(OrderItems::PaymentCardId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::PriceAtPurchase)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        UserId,
        Total,
        Status,
        ExternalSessionId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        GameId,
        PaymentCardId,
        Quantity,
        PriceAtPurchase,
    }
}

mod m20240601_000004_create_promo_codes_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_promo_codes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PromoCodes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PromoCodes::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(PromoCodes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PromoCodes::Description).string().null())
                        .col(ColumnDef::new(PromoCodes::DiscountType).string().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::DiscountValue)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PromoCodes::MinPurchase).decimal_len(10, 2).null())
                        .col(ColumnDef::new(PromoCodes::MaxDiscount).decimal_len(10, 2).null())
                        .col(ColumnDef::new(PromoCodes::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(PromoCodes::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::ValidUntil)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .check(Expr::cust(
                            "usage_limit IS NULL OR usage_count <= usage_limit",
                        ))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PromoCodes {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        DiscountValue,
        MinPurchase,
        MaxDiscount,
        UsageLimit,
        UsageCount,
        ValidFrom,
        ValidUntil,
        Active,
        CreatedAt,
    }
}
