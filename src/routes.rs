use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{BoxOffice, CreateMovieParams, ListMoviesParams, Movie},
};

const RATER_ID_HEADER: &str = "X-Rater-Id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/{title}/ratings", post(upsert_rating))
        .route("/movies/{title}/rating", get(aggregated_rating))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Bearer token check for write endpoints.
pub struct Authorized;

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        match token {
            Some(token) if token == state.auth_token => Ok(Self),
            _ => Err(AppError::Unauthorized),
        }
    }
}

pub struct RaterId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for RaterId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(RATER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMovieRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    release_date: String,
    distributor: Option<String>,
    budget: Option<i64>,
    mpa_rating: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    q: Option<String>,
    year: Option<String>,
    genre: Option<String>,
    distributor: Option<String>,
    budget: Option<String>,
    mpa_rating: Option<String>,
    limit: Option<String>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertRatingRequest {
    rating: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieResponse {
    id: String,
    title: String,
    genre: String,
    release_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    distributor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    budget: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mpa_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    box_office: Option<BoxOfficeResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxOfficeResponse {
    revenue: RevenueResponse,
    currency: String,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevenueResponse {
    worldwide: i64,
    #[serde(rename = "openingWeekendUSA", skip_serializing_if = "Option::is_none")]
    opening_weekend_usa: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviePageResponse {
    items: Vec<MovieResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingResponse {
    movie_title: String,
    rater_id: String,
    rating: f64,
}

#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    average: f64,
    count: u64,
}

impl From<Movie> for MovieResponse {
    fn from(movie: Movie) -> Self {
        Self {
            id: movie.id,
            title: movie.title,
            genre: movie.genre,
            release_date: movie.release_date.to_string(),
            distributor: movie.distributor,
            budget: movie.budget,
            mpa_rating: movie.mpa_rating,
            box_office: movie.box_office.map(BoxOfficeResponse::from),
        }
    }
}

impl From<BoxOffice> for BoxOfficeResponse {
    fn from(bo: BoxOffice) -> Self {
        Self {
            revenue: RevenueResponse {
                worldwide: bo.revenue.worldwide,
                opening_weekend_usa: bo.revenue.opening_weekend_us,
            },
            currency: bo.currency,
            source: bo.source,
            last_updated: bo.last_updated.map(|ts| ts.strftime("%Y-%m-%dT%H:%M:%SZ").to_string()),
        }
    }
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<MoviePageResponse>> {
    let year = parse_opt::<i16>(q.year, "year must be an integer")?;
    let limit = parse_opt::<i64>(q.limit, "limit must be an integer")?;
    let budget = parse_opt::<i64>(q.budget, "budget must be a non-negative integer")?;
    if budget.is_some_and(|b| b < 0) {
        return Err(AppError::BadRequest("budget must be a non-negative integer".to_string()));
    }

    let params = ListMoviesParams {
        q: q.q.unwrap_or_default(),
        year,
        genre: q.genre,
        distributor: q.distributor,
        budget_lte: budget,
        mpa_rating: q.mpa_rating,
        limit: limit.unwrap_or(0),
        cursor: q.cursor,
    };

    let page = state.movies.list_movies(params).await.map_err(|err| match err {
        AppError::InvalidInput(msg) => AppError::BadRequest(msg),
        other => other,
    })?;

    Ok(Json(MoviePageResponse {
        items: page.items.into_iter().map(MovieResponse::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    payload: Result<Json<CreateMovieRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) =
        payload.map_err(|_| AppError::InvalidInput("Malformed JSON payload".to_string()))?;

    let movie = state
        .movies
        .create_movie(CreateMovieParams {
            title: req.title,
            genre: req.genre,
            release_date: req.release_date,
            distributor: req.distributor,
            budget: req.budget,
            mpa_rating: req.mpa_rating,
        })
        .await?;

    let location = format!("/movies/{}", urlencoding::encode(&movie.title));
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(MovieResponse::from(movie)))
        .into_response())
}

pub async fn upsert_rating(
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
    RaterId(rater_id): RaterId,
    payload: Result<Json<UpsertRatingRequest>, JsonRejection>,
) -> AppResult<Response> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("movie title is required".to_string()));
    }
    let Json(req) =
        payload.map_err(|_| AppError::InvalidInput("Malformed JSON payload".to_string()))?;

    let (rating, created) = state.ratings.upsert_rating(&title, &rater_id, req.rating).await?;
    let body = Json(RatingResponse {
        movie_title: rating.movie_title.clone(),
        rater_id: rating.rater_id.clone(),
        rating: rating.value,
    });

    if created {
        let location = format!(
            "/movies/{}/ratings/{}",
            urlencoding::encode(&rating.movie_title),
            urlencoding::encode(&rating.rater_id)
        );
        return Ok((StatusCode::CREATED, [(header::LOCATION, location)], body).into_response());
    }
    Ok((StatusCode::OK, body).into_response())
}

pub async fn aggregated_rating(
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
) -> AppResult<Json<AggregateResponse>> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("movie title is required".to_string()));
    }
    let aggregate = state.ratings.aggregated_rating(&title).await?;
    Ok(Json(AggregateResponse { average: aggregate.average, count: aggregate.count }))
}

fn parse_opt<T: std::str::FromStr>(raw: Option<String>, message: &str) -> AppResult<Option<T>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            value.parse().map(Some).map_err(|_| AppError::BadRequest(message.to_string()))
        },
    }
}
