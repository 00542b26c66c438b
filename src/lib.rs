pub mod boxoffice;
pub mod config;
pub mod cursor;
pub mod db;
pub mod entities;
pub mod error;
pub mod models;
pub mod movie_service;
pub mod rating_service;
pub mod routes;
pub mod store;

use crate::{movie_service::MovieService, rating_service::RatingService};

pub struct AppState {
    pub movies: MovieService,
    pub ratings: RatingService,
    pub auth_token: String,
}
