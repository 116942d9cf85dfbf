use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_guest_identities_table::Migration),
            Box::new(m20240101_000002_create_bookings_table::Migration),
            Box::new(m20240101_000003_create_access_tokens_table::Migration),
            Box::new(m20240101_000004_create_payment_intents_table::Migration),
            Box::new(m20240101_000005_create_payment_transactions_table::Migration),
            Box::new(m20240101_000006_create_payment_splits_table::Migration),
            Box::new(m20240101_000007_create_accounts_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_guest_identities_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_guest_identities_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GuestIdentities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GuestIdentities::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GuestIdentities::Name).string().not_null())
                        .col(ColumnDef::new(GuestIdentities::Email).string().not_null())
                        .col(ColumnDef::new(GuestIdentities::Phone).string().not_null())
                        .col(
                            ColumnDef::new(GuestIdentities::PromotedAccountId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GuestIdentities::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GuestIdentities::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Emails are stored lowercased, so this unique index is the
            // case-insensitive dedupe constraint
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_guest_identities_email")
                        .table(GuestIdentities::Table)
                        .col(GuestIdentities::Email)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GuestIdentities::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum GuestIdentities {
        Table,
        Id,
        Name,
        Email,
        Phone,
        PromotedAccountId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_bookings_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_bookings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Guest- and account-owned bookings share this table; the
            // (owner_type, owner_id) pair carries ownership, so there is
            // deliberately no foreign key on owner_id
            manager
                .create_table(
                    Table::create()
                        .table(Bookings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bookings::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bookings::OwnerType).string().not_null())
                        .col(ColumnDef::new(Bookings::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(Bookings::PickupAddress).string().not_null())
                        .col(ColumnDef::new(Bookings::DropoffAddress).string().not_null())
                        .col(
                            ColumnDef::new(Bookings::PickupTime)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::DistanceKm)
                                .decimal_len(8, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::VehicleFeatures).json().not_null())
                        .col(
                            ColumnDef::new(Bookings::SupportWorkersCount)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::BaseFare)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::DistanceFare)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::VehicleFeatureFare)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::SupportWorkerFare)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::PeakSurcharge)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::FareEstimate)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::Currency).string().not_null())
                        .col(ColumnDef::new(Bookings::BookingType).string().not_null())
                        .col(ColumnDef::new(Bookings::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Bookings::Status).string().not_null())
                        .col(ColumnDef::new(Bookings::FailureReason).string().null())
                        .col(ColumnDef::new(Bookings::CancellationReason).string().null())
                        .col(
                            ColumnDef::new(Bookings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::UpdatedAt)
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
                        .name("idx_bookings_owner")
                        .table(Bookings::Table)
                        .col(Bookings::OwnerType)
                        .col(Bookings::OwnerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_status")
                        .table(Bookings::Table)
                        .col(Bookings::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bookings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Bookings {
        Table,
        Id,
        OwnerType,
        OwnerId,
        PickupAddress,
        DropoffAddress,
        PickupTime,
        DistanceKm,
        VehicleFeatures,
        SupportWorkersCount,
        BaseFare,
        DistanceFare,
        VehicleFeatureFare,
        SupportWorkerFare,
        PeakSurcharge,
        FareEstimate,
        Currency,
        BookingType,
        PaymentMethod,
        Status,
        FailureReason,
        CancellationReason,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_access_tokens_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_access_tokens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
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
                        .col(ColumnDef::new(AccessTokens::Token).string().not_null())
                        .col(ColumnDef::new(AccessTokens::BookingId).uuid().not_null())
                        .col(
                            ColumnDef::new(AccessTokens::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AccessTokens::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_access_tokens_booking_id")
                                .from(AccessTokens::Table, AccessTokens::BookingId)
                                .to(Bookings::Table, Bookings::Id)
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
                        .name("idx_access_tokens_token")
                        .table(AccessTokens::Table)
                        .col(AccessTokens::Token)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_access_tokens_booking_id")
                        .table(AccessTokens::Table)
                        .col(AccessTokens::BookingId)
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
    pub(super) enum AccessTokens {
        Table,
        Id,
        Token,
        BookingId,
        ExpiresAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Bookings {
        Table,
        Id,
    }
}

mod m20240101_000004_create_payment_intents_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payment_intents_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentIntents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentIntents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentIntents::BookingId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentIntents::ProcessorIntentId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentIntents::ClientSecret)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentIntents::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentIntents::Currency).string().not_null())
                        .col(ColumnDef::new(PaymentIntents::Status).string().not_null())
                        .col(
                            ColumnDef::new(PaymentIntents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentIntents::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_intents_booking_id")
                                .from(PaymentIntents::Table, PaymentIntents::BookingId)
                                .to(Bookings::Table, Bookings::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One intent per booking, enforced at the storage layer so a
            // racing second create loses on insert rather than double-charging
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_intents_booking_id")
                        .table(PaymentIntents::Table)
                        .col(PaymentIntents::BookingId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentIntents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PaymentIntents {
        Table,
        Id,
        BookingId,
        ProcessorIntentId,
        ClientSecret,
        Amount,
        Currency,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Bookings {
        Table,
        Id,
    }
}

mod m20240101_000005_create_payment_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_payment_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::BookingId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::Currency)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::PaymentMethod)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::ProcessorReference)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::ProcessedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_transactions_booking_id")
                                .from(
                                    PaymentTransactions::Table,
                                    PaymentTransactions::BookingId,
                                )
                                .to(Bookings::Table, Bookings::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // A booking settles at most once
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_transactions_booking_id")
                        .table(PaymentTransactions::Table)
                        .col(PaymentTransactions::BookingId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PaymentTransactions {
        Table,
        Id,
        BookingId,
        Amount,
        Currency,
        PaymentMethod,
        Status,
        ProcessorReference,
        ProcessedAt,
    }

    #[derive(DeriveIden)]
    enum Bookings {
        Table,
        Id,
    }
}

mod m20240101_000006_create_payment_splits_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_payment_splits_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentSplits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentSplits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentSplits::PaymentTransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentSplits::RecipientType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentSplits::RecipientId).uuid().null())
                        .col(
                            ColumnDef::new(PaymentSplits::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentSplits::Status).string().not_null())
                        .col(
                            ColumnDef::new(PaymentSplits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_splits_transaction_id")
                                .from(PaymentSplits::Table, PaymentSplits::PaymentTransactionId)
                                .to(PaymentTransactions::Table, PaymentTransactions::Id)
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
                        .name("idx_payment_splits_transaction_id")
                        .table(PaymentSplits::Table)
                        .col(PaymentSplits::PaymentTransactionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentSplits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PaymentSplits {
        Table,
        Id,
        PaymentTransactionId,
        RecipientType,
        RecipientId,
        Amount,
        Status,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PaymentTransactions {
        Table,
        Id,
    }
}

mod m20240101_000007_create_accounts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_accounts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Accounts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Accounts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Accounts::Name).string().not_null())
                        .col(ColumnDef::new(Accounts::Email).string().not_null())
                        .col(ColumnDef::new(Accounts::Phone).string().not_null())
                        .col(ColumnDef::new(Accounts::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Accounts::GuestIdentityId).uuid().null())
                        .col(
                            ColumnDef::new(Accounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Accounts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_accounts_guest_identity_id")
                                .from(Accounts::Table, Accounts::GuestIdentityId)
                                .to(GuestIdentities::Table, GuestIdentities::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_accounts_email")
                        .table(Accounts::Table)
                        .col(Accounts::Email)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Promotion retries look accounts up by originating guest identity
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_accounts_guest_identity_id")
                        .table(Accounts::Table)
                        .col(Accounts::GuestIdentityId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Accounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Accounts {
        Table,
        Id,
        Name,
        Email,
        Phone,
        PasswordHash,
        GuestIdentityId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum GuestIdentities {
        Table,
        Id,
    }
}
