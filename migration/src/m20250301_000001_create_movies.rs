use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(string(Movies::Id).primary_key())
                    .col(string(Movies::Title))
                    .col(string(Movies::TitleKey))
                    .col(string(Movies::Genre))
                    .col(string(Movies::ReleaseDate))
                    .col(string_null(Movies::Distributor))
                    .col(big_integer_null(Movies::Budget))
                    .col(string_null(Movies::MpaRating))
                    .col(text_null(Movies::BoxOffice))
                    .col(big_integer(Movies::CreatedAt))
                    .col(big_integer(Movies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_title_key_unique")
                    .table(Movies::Table)
                    .col(Movies::TitleKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_created_at_id")
                    .table(Movies::Table)
                    .col(Movies::CreatedAt)
                    .col(Movies::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Movies {
    Table,
    Id,
    Title,
    TitleKey,
    Genre,
    ReleaseDate,
    Distributor,
    Budget,
    MpaRating,
    BoxOffice,
    CreatedAt,
    UpdatedAt,
}
