use async_trait::async_trait;
use jiff::{Timestamp, civil::Date};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
    sea_query::{Expr, Func, LikeExpr, OnConflict},
};

use super::{MovieStore, RatingStore};
use crate::{
    entities::{movie, rating},
    error::{StoreError, StoreResult},
    models::{BoxOffice, Movie, MovieCursor, MovieFilter, NewMovie, Rating, SupplementalFields},
};

/// Durable store backed by sea-orm. Uniqueness lives in the schema's unique indexes.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MovieStore for SeaOrmStore {
    async fn create_movie(&self, movie: &NewMovie) -> StoreResult<()> {
        let now = now_micros();
        let model = movie::ActiveModel {
            id: Set(movie.id.clone()),
            title: Set(movie.title.clone()),
            title_key: Set(movie.title.to_lowercase()),
            genre: Set(movie.genre.clone()),
            release_date: Set(movie.release_date.to_string()),
            distributor: Set(movie.distributor.clone()),
            budget: Set(movie.budget),
            mpa_rating: Set(movie.mpa_rating.clone()),
            box_office: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        movie::Entity::insert(model).exec_without_returning(&self.db).await?;
        Ok(())
    }

    async fn update_supplemental(&self, id: &str, fields: &SupplementalFields) -> StoreResult<()> {
        let box_office = fields.box_office.as_ref().map(serde_json::to_string).transpose()?;

        let result = movie::Entity::update_many()
            .col_expr(movie::Column::Distributor, Expr::value(fields.distributor.clone()))
            .col_expr(movie::Column::Budget, Expr::value(fields.budget))
            .col_expr(movie::Column::MpaRating, Expr::value(fields.mpa_rating.clone()))
            .col_expr(movie::Column::BoxOffice, Expr::value(box_office))
            .col_expr(movie::Column::UpdatedAt, Expr::value(now_micros()))
            .filter(movie::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_by_title(&self, title: &str) -> StoreResult<Movie> {
        let row = movie::Entity::find()
            .filter(movie::Column::TitleKey.eq(title.to_lowercase()))
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        to_movie(row)
    }

    async fn list_movies(
        &self,
        filter: &MovieFilter,
        limit: u64,
        after: Option<&MovieCursor>,
    ) -> StoreResult<Vec<Movie>> {
        let mut cond = Condition::all();

        if let Some(q) = &filter.query {
            let pattern = format!("%{}%", escape_like(&q.to_lowercase()));
            cond = cond.add(movie::Column::TitleKey.like(LikeExpr::new(pattern).escape('\\')));
        }
        if let Some(year) = filter.year {
            cond = cond.add(movie::Column::ReleaseDate.starts_with(format!("{year:04}-")));
        }
        if let Some(genre) = &filter.genre {
            cond = cond.add(lower_eq(movie::Column::Genre, genre));
        }
        if let Some(distributor) = &filter.distributor {
            cond = cond.add(lower_eq(movie::Column::Distributor, distributor));
        }
        if let Some(mpa) = &filter.mpa_rating {
            cond = cond.add(lower_eq(movie::Column::MpaRating, mpa));
        }
        if let Some(ceiling) = filter.budget_lte {
            cond = cond.add(movie::Column::Budget.is_not_null()).add(movie::Column::Budget.lte(ceiling));
        }
        if let Some(cursor) = after {
            let created_at = to_micros(cursor.created_at);
            cond = cond.add(
                Condition::any().add(movie::Column::CreatedAt.gt(created_at)).add(
                    Condition::all()
                        .add(movie::Column::CreatedAt.eq(created_at))
                        .add(movie::Column::Id.gt(cursor.id.clone())),
                ),
            );
        }

        let rows = movie::Entity::find()
            .filter(cond)
            .order_by_asc(movie::Column::CreatedAt)
            .order_by_asc(movie::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        rows.into_iter().map(to_movie).collect()
    }
}

#[async_trait]
impl RatingStore for SeaOrmStore {
    async fn upsert_rating(&self, rating: &Rating) -> StoreResult<bool> {
        let txn = self.db.begin().await?;

        let model = rating::ActiveModel {
            id: Default::default(),
            movie_id: Set(rating.movie_id.clone()),
            rater_id: Set(rating.rater_id.clone()),
            value: Set(rating.value),
            created_at: Set(to_micros(rating.created_at)),
            updated_at: Set(to_micros(rating.updated_at)),
        };
        let inserted = rating::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([rating::Column::MovieId, rating::Column::RaterId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        let created = inserted > 0;
        if !created {
            rating::Entity::update_many()
                .col_expr(rating::Column::Value, Expr::value(rating.value))
                .col_expr(rating::Column::UpdatedAt, Expr::value(to_micros(rating.updated_at)))
                .filter(rating::Column::MovieId.eq(rating.movie_id.as_str()))
                .filter(rating::Column::RaterId.eq(rating.rater_id.as_str()))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(created)
    }

    async fn aggregate_ratings(&self, movie_id: &str) -> StoreResult<(f64, u64)> {
        let row: Option<(Option<f64>, i64)> = rating::Entity::find()
            .select_only()
            .column_as(Expr::expr(Func::avg(Expr::col(rating::Column::Value))), "average")
            .column_as(Expr::expr(Func::count(Expr::col(rating::Column::Id))), "count")
            .filter(rating::Column::MovieId.eq(movie_id))
            .into_tuple()
            .one(&self.db)
            .await?;

        let (average, count) = row.unwrap_or((None, 0));
        Ok((average.unwrap_or(0.0), u64::try_from(count).unwrap_or(0)))
    }
}

fn lower_eq(column: movie::Column, value: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value.to_lowercase())
}

/// Escapes `LIKE` metacharacters so user input matches literally under `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn to_movie(row: movie::Model) -> StoreResult<Movie> {
    let release_date: Date = row.release_date.parse().map_err(anyhow::Error::from)?;
    let box_office: Option<BoxOffice> =
        row.box_office.as_deref().map(serde_json::from_str).transpose()?;

    Ok(Movie {
        id: row.id,
        title: row.title,
        genre: row.genre,
        release_date,
        distributor: row.distributor,
        budget: row.budget,
        mpa_rating: row.mpa_rating,
        box_office,
        created_at: from_micros(row.created_at)?,
        updated_at: from_micros(row.updated_at)?,
    })
}

fn now_micros() -> i64 {
    to_micros(Timestamp::now())
}

fn to_micros(ts: Timestamp) -> i64 {
    ts.as_microsecond()
}

fn from_micros(micros: i64) -> StoreResult<Timestamp> {
    Timestamp::from_microsecond(micros).map_err(|err| StoreError::Backend(err.into()))
}
