use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use tokio::sync::RwLock;

use super::{MovieStore, RatingStore};
use crate::{
    error::{StoreError, StoreResult},
    models::{Movie, MovieCursor, MovieFilter, NewMovie, Rating, SupplementalFields},
};

/// Process-local store behind a single reader/writer lock.
///
/// Uniqueness checks and inserts happen under the same write guard, so
/// concurrent callers racing on a title or a `(movie, rater)` pair resolve to
/// exactly one row.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    movies: HashMap<String, Movie>,
    ids_by_title: HashMap<String, String>,
    ratings: HashMap<(String, String), Rating>,
    last_created_at: Option<Timestamp>,
}

impl State {
    /// Wall clock, bumped forward when needed so creation order is strict.
    fn next_created_at(&mut self) -> StoreResult<Timestamp> {
        let now = Timestamp::now();
        let ts = match self.last_created_at {
            Some(last) if last >= now => {
                last.checked_add(SignedDuration::from_nanos(1)).map_err(anyhow::Error::from)?
            },
            _ => now,
        };
        self.last_created_at = Some(ts);
        Ok(ts)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovieStore for InMemoryStore {
    async fn create_movie(&self, movie: &NewMovie) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let key = movie.title.to_lowercase();
        if state.ids_by_title.contains_key(&key) || state.movies.contains_key(&movie.id) {
            return Err(StoreError::AlreadyExists);
        }

        let now = state.next_created_at()?;
        let stored = Movie {
            id: movie.id.clone(),
            title: movie.title.clone(),
            genre: movie.genre.clone(),
            release_date: movie.release_date,
            distributor: movie.distributor.clone(),
            budget: movie.budget,
            mpa_rating: movie.mpa_rating.clone(),
            box_office: None,
            created_at: now,
            updated_at: now,
        };
        state.ids_by_title.insert(key, movie.id.clone());
        state.movies.insert(movie.id.clone(), stored);
        Ok(())
    }

    async fn update_supplemental(&self, id: &str, fields: &SupplementalFields) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let movie = state.movies.get_mut(id).ok_or(StoreError::NotFound)?;
        movie.distributor = fields.distributor.clone();
        movie.budget = fields.budget;
        movie.mpa_rating = fields.mpa_rating.clone();
        movie.box_office = fields.box_office.clone();
        movie.updated_at = Timestamp::now().max(movie.created_at);
        Ok(())
    }

    async fn get_by_title(&self, title: &str) -> StoreResult<Movie> {
        let state = self.state.read().await;
        state
            .ids_by_title
            .get(&title.to_lowercase())
            .and_then(|id| state.movies.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_movies(
        &self,
        filter: &MovieFilter,
        limit: u64,
        after: Option<&MovieCursor>,
    ) -> StoreResult<Vec<Movie>> {
        let state = self.state.read().await;
        let mut rows: Vec<&Movie> = state
            .movies
            .values()
            .filter(|m| filter.matches(m))
            .filter(|m| match after {
                Some(c) => (m.created_at, m.id.as_str()) > (c.created_at, c.id.as_str()),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(rows.into_iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl RatingStore for InMemoryStore {
    async fn upsert_rating(&self, rating: &Rating) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let key = (rating.movie_id.clone(), rating.rater_id.clone());
        match state.ratings.get_mut(&key) {
            Some(stored) => {
                stored.value = rating.value;
                stored.updated_at = rating.updated_at;
                Ok(false)
            },
            None => {
                state.ratings.insert(key, rating.clone());
                Ok(true)
            },
        }
    }

    async fn aggregate_ratings(&self, movie_id: &str) -> StoreResult<(f64, u64)> {
        let state = self.state.read().await;
        let (sum, count) = state
            .ratings
            .iter()
            .filter(|((id, _), _)| id == movie_id)
            .fold((0.0, 0u64), |(sum, count), (_, stored)| (sum + stored.value, count + 1));
        if count == 0 {
            return Ok((0.0, 0));
        }
        Ok((sum / count as f64, count))
    }
}
