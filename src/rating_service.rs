use std::sync::Arc;

use jiff::Timestamp;

use crate::{
    error::{AppError, AppResult},
    models::{AggregatedRating, Rating},
    store::{MovieStore, RatingStore},
};

const MIN_RATING: f64 = 0.5;
const MAX_RATING: f64 = 5.0;
const STEP_TOLERANCE: f64 = 1e-9;

pub struct RatingService {
    movies: Arc<dyn MovieStore>,
    ratings: Arc<dyn RatingStore>,
}

impl RatingService {
    pub fn new(movies: Arc<dyn MovieStore>, ratings: Arc<dyn RatingStore>) -> Self {
        Self { movies, ratings }
    }

    /// Record `rater_id`'s rating for a movie. The flag is `true` when this is
    /// the rater's first rating of that movie.
    pub async fn upsert_rating(
        &self,
        movie_title: &str,
        rater_id: &str,
        value: f64,
    ) -> AppResult<(Rating, bool)> {
        if !is_valid_rating(value) {
            return Err(AppError::Validation(
                "rating must be between 0.5 and 5.0 in 0.5 steps".to_string(),
            ));
        }

        let movie = self.movies.get_by_title(movie_title).await?;
        let now = Timestamp::now();
        let rating = Rating {
            movie_id: movie.id,
            movie_title: movie.title,
            rater_id: rater_id.to_string(),
            value,
            created_at: now,
            updated_at: now,
        };

        let created = self.ratings.upsert_rating(&rating).await?;
        tracing::debug!(
            movie = %rating.movie_title,
            rater = %rating.rater_id,
            created,
            "rating stored"
        );
        Ok((rating, created))
    }

    pub async fn aggregated_rating(&self, movie_title: &str) -> AppResult<AggregatedRating> {
        let movie = self.movies.get_by_title(movie_title).await?;
        let (average, count) = self.ratings.aggregate_ratings(&movie.id).await?;
        if count == 0 {
            return Ok(AggregatedRating { average: 0.0, count: 0 });
        }
        Ok(AggregatedRating { average: round_one_decimal(average), count })
    }
}

fn is_valid_rating(value: f64) -> bool {
    if !(MIN_RATING..=MAX_RATING).contains(&value) {
        return false;
    }
    let doubled = value * 2.0;
    (doubled - doubled.round()).abs() < STEP_TOLERANCE
}

/// `f64::round` rounds half away from zero, so 4.25 becomes 4.3.
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
