use std::{sync::Arc, time::Duration};

use jiff::civil::Date;
use tracing::{debug, warn};

use crate::{
    boxoffice::{BoxOfficeError, BoxOfficeProvider, BoxOfficeRecord},
    cursor,
    error::{AppError, AppResult, StoreError},
    models::{
        CreateMovieParams, ListMoviesParams, Movie, MovieCursor, MovieFilter, MoviePage, NewMovie,
        SupplementalFields,
    },
    store::MovieStore,
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct MovieService {
    movies: Arc<dyn MovieStore>,
    box_office: Arc<dyn BoxOfficeProvider>,
    enrichment_timeout: Duration,
}

impl MovieService {
    pub fn new(
        movies: Arc<dyn MovieStore>,
        box_office: Arc<dyn BoxOfficeProvider>,
        enrichment_timeout: Duration,
    ) -> Self {
        Self { movies, box_office, enrichment_timeout }
    }

    /// Insert the caller's movie, enrich it from the box-office provider when
    /// possible, and return the record as stored.
    pub async fn create_movie(&self, params: CreateMovieParams) -> AppResult<Movie> {
        let candidate = validate(params)?;

        self.movies.create_movie(&candidate).await?;
        debug!(title = %candidate.title, id = %candidate.id, "movie created");

        if let Some(record) = self.fetch_box_office(&candidate.title).await {
            let fields = reconcile(&candidate, &record);
            match self.movies.update_supplemental(&candidate.id, &fields).await {
                Ok(()) => debug!(title = %candidate.title, "box office data applied"),
                Err(StoreError::NotFound) => {
                    warn!(title = %candidate.title, "movie vanished before box office update")
                },
                Err(err) => {
                    warn!(title = %candidate.title, error = %err, "failed to apply box office data")
                },
            }
        }

        Ok(self.movies.get_by_title(&candidate.title).await?)
    }

    /// One page of matching movies in creation order, plus a continuation
    /// token when more rows remain.
    pub async fn list_movies(&self, params: ListMoviesParams) -> AppResult<MoviePage> {
        let limit = clamp_page_size(params.limit);

        let after: Option<MovieCursor> = match params.cursor.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Some(cursor::decode(token)?),
            _ => None,
        };

        let filter = MovieFilter {
            query: non_blank(Some(params.q)),
            year: params.year,
            genre: non_blank(params.genre),
            distributor: non_blank(params.distributor),
            budget_lte: params.budget_lte,
            mpa_rating: non_blank(params.mpa_rating),
        };

        let mut items = self.movies.list_movies(&filter, limit + 1, after.as_ref()).await?;

        let mut next_cursor = None;
        if items.len() as u64 > limit {
            items.truncate(limit as usize);
            if let Some(last) = items.last() {
                next_cursor = Some(cursor::encode(&MovieCursor {
                    created_at: last.created_at,
                    id: last.id.clone(),
                }));
            }
        }

        Ok(MoviePage { items, next_cursor })
    }

    /// Provider lookup bounded by the enrichment timeout. Every failure
    /// degrades to `None`.
    async fn fetch_box_office(&self, title: &str) -> Option<BoxOfficeRecord> {
        let outcome = tokio::time::timeout(self.enrichment_timeout, self.box_office.fetch(title))
            .await
            .unwrap_or(Err(BoxOfficeError::Timeout));

        match outcome {
            Ok(record) => Some(record),
            Err(BoxOfficeError::NotFound) => {
                debug!(title = %title, "no box office data");
                None
            },
            Err(err) => {
                warn!(title = %title, error = %err, "box office request failed (ignored for creation)");
                None
            },
        }
    }
}

fn validate(params: CreateMovieParams) -> AppResult<NewMovie> {
    let title = params.title.trim();
    let genre = params.genre.trim();
    if title.is_empty() || genre.is_empty() {
        return Err(AppError::InvalidInput("title and genre are required".to_string()));
    }

    let release_date = parse_release_date(&params.release_date)
        .ok_or_else(|| AppError::InvalidInput("releaseDate must be YYYY-MM-DD".to_string()))?;

    if params.budget.is_some_and(|b| b < 0) {
        return Err(AppError::InvalidInput("budget must be non-negative".to_string()));
    }

    Ok(NewMovie {
        id: uuid::Uuid::new_v4().to_string(),
        title: title.to_string(),
        genre: genre.to_string(),
        release_date,
        distributor: params.distributor,
        budget: params.budget,
        mpa_rating: params.mpa_rating,
    })
}

/// Zero-padded `YYYY-MM-DD` only. `strptime` alone accepts `2023-1-5`.
fn parse_release_date(raw: &str) -> Option<Date> {
    let padded = raw.len() == 10
        && raw.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !padded {
        return None;
    }
    Date::strptime(RELEASE_DATE_FORMAT, raw).ok()
}

/// Caller-supplied values win; the provider only fills gaps. The box-office
/// block is always taken whole from the provider.
fn reconcile(candidate: &NewMovie, record: &BoxOfficeRecord) -> SupplementalFields {
    SupplementalFields {
        distributor: candidate.distributor.clone().or_else(|| record.distributor.clone()),
        budget: candidate.budget.or(record.budget),
        mpa_rating: candidate.mpa_rating.clone().or_else(|| record.mpa_rating.clone()),
        box_office: Some(record.box_office()),
    }
}

fn clamp_page_size(requested: i64) -> u64 {
    let limit = if requested <= 0 { DEFAULT_PAGE_SIZE } else { requested.min(MAX_PAGE_SIZE) };
    limit as u64
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::StoreResult,
        models::{BoxOffice, BoxOfficeRevenue},
        store::InMemoryStore,
    };

    enum Reply {
        Record(BoxOfficeRecord),
        NotFound,
        Fail,
        Hang,
    }

    struct StubProvider {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self { reply, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl BoxOfficeProvider for StubProvider {
        async fn fetch(&self, _title: &str) -> Result<BoxOfficeRecord, BoxOfficeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Record(record) => Ok(record.clone()),
                Reply::NotFound => Err(BoxOfficeError::NotFound),
                Reply::Fail => Err(BoxOfficeError::Status { status: 503, body: "down".into() }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(BoxOfficeError::NotFound)
                },
            }
        }
    }

    /// Wraps the in-memory store, counting supplemental updates and optionally
    /// simulating a concurrent delete.
    struct TrackingStore {
        inner: InMemoryStore,
        updates: AtomicUsize,
        lose_row: bool,
    }

    #[async_trait]
    impl MovieStore for TrackingStore {
        async fn create_movie(&self, movie: &NewMovie) -> StoreResult<()> {
            self.inner.create_movie(movie).await
        }

        async fn update_supplemental(&self, id: &str, fields: &SupplementalFields) -> StoreResult<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.lose_row {
                return Err(StoreError::NotFound);
            }
            self.inner.update_supplemental(id, fields).await
        }

        async fn get_by_title(&self, title: &str) -> StoreResult<Movie> {
            self.inner.get_by_title(title).await
        }

        async fn list_movies(
            &self,
            filter: &MovieFilter,
            limit: u64,
            after: Option<&MovieCursor>,
        ) -> StoreResult<Vec<Movie>> {
            self.inner.list_movies(filter, limit, after).await
        }
    }

    fn tracking(lose_row: bool) -> Arc<TrackingStore> {
        Arc::new(TrackingStore { inner: InMemoryStore::new(), updates: AtomicUsize::new(0), lose_row })
    }

    fn record() -> BoxOfficeRecord {
        BoxOfficeRecord {
            distributor: Some("Provider Pictures".to_string()),
            budget: Some(90_000_000),
            mpa_rating: Some("R".to_string()),
            revenue: BoxOfficeRevenue { worldwide: 350_000_000, opening_weekend_us: Some(40_000_000) },
            currency: "USD".to_string(),
            source: "BoxOfficeMojo".to_string(),
            last_updated: Some("2024-05-01T00:00:00Z".parse().unwrap()),
        }
    }

    fn service(store: Arc<dyn MovieStore>, provider: Arc<dyn BoxOfficeProvider>) -> MovieService {
        MovieService::new(store, provider, Duration::from_millis(50))
    }

    fn params(title: &str) -> CreateMovieParams {
        CreateMovieParams {
            title: title.to_string(),
            genre: "Action".to_string(),
            release_date: "2023-01-15".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creates_movie_without_box_office_data() {
        let svc = service(Arc::new(InMemoryStore::new()), StubProvider::new(Reply::NotFound));
        let movie = svc
            .create_movie(CreateMovieParams {
                distributor: Some("Test Studios".to_string()),
                budget: Some(50_000_000),
                mpa_rating: Some("PG-13".to_string()),
                ..params("  Test Movie 1  ")
            })
            .await
            .unwrap();

        assert_eq!(movie.title, "Test Movie 1");
        assert_eq!(movie.release_date, jiff::civil::date(2023, 1, 15));
        assert_eq!(movie.distributor.as_deref(), Some("Test Studios"));
        assert_eq!(movie.box_office, None);
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let svc = service(Arc::new(InMemoryStore::new()), StubProvider::new(Reply::NotFound));

        let cases = [
            CreateMovieParams { title: "   ".to_string(), ..params("x") },
            CreateMovieParams { genre: "".to_string(), ..params("x") },
            CreateMovieParams { release_date: "15/01/2023".to_string(), ..params("x") },
            CreateMovieParams { release_date: "2023-02-30".to_string(), ..params("x") },
            CreateMovieParams { release_date: "2023-1-5".to_string(), ..params("x") },
            CreateMovieParams { release_date: " 2023-01-15".to_string(), ..params("x") },
            CreateMovieParams { release_date: "2023-01-15 ".to_string(), ..params("x") },
            CreateMovieParams { release_date: "+2023-01-1".to_string(), ..params("x") },
            CreateMovieParams { budget: Some(-1), ..params("x") },
        ];
        for case in cases {
            assert!(matches!(svc.create_movie(case).await, Err(AppError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn duplicate_title_fails_without_enrichment() {
        let store = tracking(false);
        let provider = StubProvider::new(Reply::Record(record()));
        let svc = service(store.clone(), provider.clone());

        svc.create_movie(params("Dune")).await.unwrap();
        let err = svc.create_movie(params("DUNE")).await.unwrap_err();

        assert!(matches!(err, AppError::AlreadyExists));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enrichment_only_fills_missing_fields() {
        let svc = service(Arc::new(InMemoryStore::new()), StubProvider::new(Reply::Record(record())));
        let movie = svc
            .create_movie(CreateMovieParams {
                distributor: Some("Caller Films".to_string()),
                ..params("Arrival")
            })
            .await
            .unwrap();

        assert_eq!(movie.distributor.as_deref(), Some("Caller Films"));
        assert_eq!(movie.budget, Some(90_000_000));
        assert_eq!(movie.mpa_rating.as_deref(), Some("R"));
        assert_eq!(
            movie.box_office,
            Some(BoxOffice {
                revenue: BoxOfficeRevenue {
                    worldwide: 350_000_000,
                    opening_weekend_us: Some(40_000_000)
                },
                currency: "USD".to_string(),
                source: "BoxOfficeMojo".to_string(),
                last_updated: Some("2024-05-01T00:00:00Z".parse().unwrap()),
            })
        );
    }

    #[tokio::test]
    async fn provider_failure_still_creates_movie() {
        for reply in [Reply::Fail, Reply::Hang] {
            let store = tracking(false);
            let svc = service(store.clone(), StubProvider::new(reply));

            let movie = svc.create_movie(params("Tenet")).await.unwrap();
            assert_eq!(movie.box_office, None);
            assert_eq!(movie.distributor, None);
            assert_eq!(store.updates.load(Ordering::SeqCst), 0);
            assert!(store.get_by_title("tenet").await.is_ok());
        }
    }

    #[tokio::test]
    async fn lost_row_during_reconciliation_is_not_fatal() {
        let store = tracking(true);
        let svc = service(store.clone(), StubProvider::new(Reply::Record(record())));

        let movie = svc.create_movie(params("Sicario")).await.unwrap();
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
        assert_eq!(movie.box_office, None);
    }

    async fn seeded(count: usize) -> MovieService {
        let svc = service(Arc::new(InMemoryStore::new()), StubProvider::new(Reply::NotFound));
        for i in 0..count {
            svc.create_movie(params(&format!("Movie {i:02}"))).await.unwrap();
        }
        svc
    }

    async fn drain(svc: &MovieService, limit: i64) -> Vec<Movie> {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = svc
                .list_movies(ListMoviesParams { limit, cursor: cursor.clone(), ..Default::default() })
                .await
                .unwrap();
            assert!(page.items.len() as i64 <= limit);
            seen.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return seen,
            }
        }
    }

    #[tokio::test]
    async fn pagination_visits_every_row_once_in_order() {
        let svc = seeded(7).await;
        let rows = drain(&svc, 3).await;

        let titles: Vec<_> = rows.iter().map(|m| m.title.clone()).collect();
        let expected: Vec<_> = (0..7).map(|i| format!("Movie {i:02}")).collect();
        assert_eq!(titles, expected);

        let ids: HashSet<_> = rows.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), 7);
    }

    #[tokio::test]
    async fn exact_multiple_ends_without_cursor() {
        let svc = seeded(6).await;

        let first = svc.list_movies(ListMoviesParams { limit: 3, ..Default::default() }).await.unwrap();
        assert_eq!(first.items.len(), 3);
        let second = svc
            .list_movies(ListMoviesParams { limit: 3, cursor: first.next_cursor, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 3);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn inserts_after_first_page_show_up_at_the_end() {
        let svc = seeded(4).await;
        let first = svc.list_movies(ListMoviesParams { limit: 2, ..Default::default() }).await.unwrap();

        svc.create_movie(params("Late Arrival")).await.unwrap();

        let mut rows = first.items;
        let mut cursor = first.next_cursor;
        while let Some(token) = cursor {
            let page = svc
                .list_movies(ListMoviesParams { limit: 2, cursor: Some(token), ..Default::default() })
                .await
                .unwrap();
            rows.extend(page.items);
            cursor = page.next_cursor;
        }

        let titles: Vec<_> = rows.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Movie 00", "Movie 01", "Movie 02", "Movie 03", "Late Arrival"]);
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let svc = seeded(105).await;

        let page = svc.list_movies(ListMoviesParams::default()).await.unwrap();
        assert_eq!(page.items.len(), 20);
        assert!(page.next_cursor.is_some());

        let page = svc.list_movies(ListMoviesParams { limit: -5, ..Default::default() }).await.unwrap();
        assert_eq!(page.items.len(), 20);

        let page = svc.list_movies(ListMoviesParams { limit: 500, ..Default::default() }).await.unwrap();
        assert_eq!(page.items.len(), 100);
    }

    #[tokio::test]
    async fn invalid_cursor_is_invalid_input() {
        let svc = seeded(1).await;
        let err = svc
            .list_movies(ListMoviesParams { cursor: Some("%%%".to_string()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn filters_are_conjunctive_and_blank_values_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store, StubProvider::new(Reply::NotFound));
        for (title, genre, date, rating) in [
            ("The Matrix", "Sci-Fi", "1999-03-31", "R"),
            ("Matrix Reloaded", "sci-fi", "2003-05-15", "R"),
            ("The Lion King", "Animation", "1994-06-24", "G"),
        ] {
            svc.create_movie(CreateMovieParams {
                title: title.to_string(),
                genre: genre.to_string(),
                release_date: date.to_string(),
                mpa_rating: Some(rating.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let page = svc
            .list_movies(ListMoviesParams {
                q: "matrix".to_string(),
                genre: Some("SCI-FI".to_string()),
                distributor: Some("   ".to_string()),
                mpa_rating: Some("r".to_string()),
                year: Some(2003),
                ..Default::default()
            })
            .await
            .unwrap();
        let titles: Vec<_> = page.items.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Matrix Reloaded"]);

        let page = svc
            .list_movies(ListMoviesParams { q: "  ".to_string(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
    }
}
