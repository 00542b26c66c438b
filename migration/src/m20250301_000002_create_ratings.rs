use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250301_000001_create_movies::Movies;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ratings::Table)
                    .if_not_exists()
                    .col(pk_auto(Ratings::Id))
                    .col(string(Ratings::MovieId))
                    .col(string(Ratings::RaterId))
                    .col(double(Ratings::Value))
                    .col(big_integer(Ratings::CreatedAt))
                    .col(big_integer(Ratings::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ratings_movie_id")
                            .from(Ratings::Table, Ratings::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ratings_movie_rater_unique")
                    .table(Ratings::Table)
                    .col(Ratings::MovieId)
                    .col(Ratings::RaterId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Ratings::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Ratings {
    Table,
    Id,
    MovieId,
    RaterId,
    Value,
    CreatedAt,
    UpdatedAt,
}
