use std::sync::Arc;

use cinema::{
    AppState,
    boxoffice::{BoxOfficeProvider, DisabledBoxOffice, HttpBoxOfficeClient},
    config::Config,
    db,
    movie_service::MovieService,
    rating_service::RatingService,
    routes,
    store::SeaOrmStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,cinema=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let db = db::connect_and_migrate(config.database_url.as_str()).await?;
    let store = Arc::new(SeaOrmStore::new(db));

    let box_office: Arc<dyn BoxOfficeProvider> = if config.boxoffice_url.trim().is_empty() {
        tracing::warn!("BOXOFFICE_URL not set; movies will be created without box office data");
        Arc::new(DisabledBoxOffice)
    } else {
        let http = wreq::Client::builder().timeout(config.boxoffice_timeout).build()?;
        Arc::new(HttpBoxOfficeClient::new(
            http,
            config.boxoffice_url.clone(),
            config.boxoffice_api_key.clone(),
            config.boxoffice_rps,
        ))
    };

    let state = Arc::new(AppState {
        movies: MovieService::new(store.clone(), box_office, config.boxoffice_timeout),
        ratings: RatingService::new(store.clone(), store),
        auth_token: config.auth_token.clone(),
    });

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
