use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use cinema::{
    AppState, boxoffice::DisabledBoxOffice, movie_service::MovieService,
    rating_service::RatingService, routes, store::InMemoryStore,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn app() -> Router {
    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(AppState {
        movies: MovieService::new(store.clone(), Arc::new(DisabledBoxOffice), Duration::from_secs(1)),
        ratings: RatingService::new(store.clone(), store),
        auth_token: TOKEN.to_string(),
    });
    routes::router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let location =
        resp.headers().get(header::LOCATION).map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, location, body)
}

fn create(body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/movies").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn rate(title: &str, rater: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::post(format!("/movies/{title}/ratings"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(rater) = rater {
        builder = builder.header("X-Rater-Id", rater);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn movie_lifecycle_over_http() {
    let app = app();

    let movie = json!({ "title": "Blade Runner", "genre": "Sci-Fi", "releaseDate": "1982-06-25", "budget": 28000000 });

    let (status, _, body) = send(&app, create(movie.clone(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, location, body) = send(&app, create(movie.clone(), Some(TOKEN))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(location.as_deref(), Some("/movies/Blade%20Runner"));
    assert_eq!(body["releaseDate"], "1982-06-25");
    assert_eq!(body["budget"], 28000000);
    assert!(body.get("boxOffice").is_none());
    assert!(body.get("distributor").is_none());

    let (status, _, body) = send(&app, create(movie, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _, _) = send(
        &app,
        create(json!({ "title": "X", "genre": "Y", "releaseDate": "June 1st" }), Some(TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, body) = send(&app, get("/movies?q=blade&year=1982")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body.get("nextCursor").is_none());
}

#[tokio::test]
async fn list_rejects_bad_query_values() {
    let app = app();
    for uri in ["/movies?year=abc", "/movies?limit=ten", "/movies?budget=-3", "/movies?cursor=@@@"] {
        let (status, _, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn listing_pages_through_cursor() {
    let app = app();
    for i in 0..5 {
        let movie = json!({ "title": format!("Film {i}"), "genre": "Drama", "releaseDate": "2001-01-01" });
        let (status, _, _) = send(&app, create(movie, Some(TOKEN))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let mut titles = Vec::new();
    let mut uri = "/movies?limit=2".to_string();
    loop {
        let (status, _, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        for item in body["items"].as_array().unwrap() {
            titles.push(item["title"].as_str().unwrap().to_string());
        }
        match body["nextCursor"].as_str() {
            Some(cursor) => uri = format!("/movies?limit=2&cursor={cursor}"),
            None => break,
        }
    }
    assert_eq!(titles, ["Film 0", "Film 1", "Film 2", "Film 3", "Film 4"]);
}

#[tokio::test]
async fn ratings_over_http() {
    let app = app();
    let movie = json!({ "title": "Amelie", "genre": "Romance", "releaseDate": "2001-04-25" });
    send(&app, create(movie, Some(TOKEN))).await;

    let (status, _, _) = send(&app, rate("Amelie", None, r#"{"rating": 4.0}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, rate("Amelie", Some("u1"), "{not json")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, body) = send(&app, rate("Amelie", Some("u1"), r#"{"rating": 2.7}"#)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "UNPROCESSABLE_ENTITY");

    let (status, _, _) = send(&app, rate("Unknown", Some("u1"), r#"{"rating": 3.0}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, location, body) = send(&app, rate("amelie", Some("u1"), r#"{"rating": 3.0}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(location.as_deref(), Some("/movies/Amelie/ratings/u1"));
    assert_eq!(body, json!({ "movieTitle": "Amelie", "raterId": "u1", "rating": 3.0 }));

    let (status, location, _) = send(&app, rate("Amelie", Some("u1"), r#"{"rating": 4.5}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(location.is_none());

    send(&app, rate("Amelie", Some("u2"), r#"{"rating": 5.0}"#)).await;

    let (status, _, body) = send(&app, get("/movies/Amelie/rating")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "average": 4.8, "count": 2 }));
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = app();

    let req = Request::get("/healthz").header("x-request-id", "req-42").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-request-id"], "req-42");

    let resp = app.clone().oneshot(get("/healthz")).await.unwrap();
    let generated = resp.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let resp = app.oneshot(get("/movies/Nope/rating")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn healthz_is_ok() {
    let (status, _, _) = send(&app(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}
