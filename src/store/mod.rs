//! Persistence contracts consumed by the services.
//!
//! Both implementations report uniqueness conflicts and missing rows through
//! [`StoreError`](crate::error::StoreError) so the services never see backend detail.

mod memory;
mod sql;

use async_trait::async_trait;

pub use memory::InMemoryStore;
pub use sql::SeaOrmStore;

use crate::{
    error::StoreResult,
    models::{Movie, MovieCursor, MovieFilter, NewMovie, Rating, SupplementalFields},
};

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Insert a new movie. Fails with `AlreadyExists` on a case-insensitive title clash.
    async fn create_movie(&self, movie: &NewMovie) -> StoreResult<()>;

    /// Overwrite exactly the supplemental columns of a movie.
    async fn update_supplemental(&self, id: &str, fields: &SupplementalFields) -> StoreResult<()>;

    /// Exact, case-insensitive title lookup.
    async fn get_by_title(&self, title: &str) -> StoreResult<Movie>;

    /// Matching movies ordered by `(created_at, id)` ascending, strictly after `after`.
    async fn list_movies(
        &self,
        filter: &MovieFilter,
        limit: u64,
        after: Option<&MovieCursor>,
    ) -> StoreResult<Vec<Movie>>;
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Insert the rating for `(movie_id, rater_id)`, or update its value and
    /// `updated_at` in place. `true` when a row was created.
    async fn upsert_rating(&self, rating: &Rating) -> StoreResult<bool>;

    /// Mean value and count of all ratings for a movie. Mean is 0 when there are none.
    async fn aggregate_ratings(&self, movie_id: &str) -> StoreResult<(f64, u64)>;
}
