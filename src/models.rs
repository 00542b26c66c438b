use jiff::{Timestamp, civil::Date};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub genre: String,
    pub release_date: Date,
    pub distributor: Option<String>,
    pub budget: Option<i64>,
    pub mpa_rating: Option<String>,
    pub box_office: Option<BoxOffice>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Candidate record handed to the store; timestamps are assigned on insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMovie {
    pub id: String,
    pub title: String,
    pub genre: String,
    pub release_date: Date,
    pub distributor: Option<String>,
    pub budget: Option<i64>,
    pub mpa_rating: Option<String>,
}

/// Box-office block owned by a movie. Always written as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxOffice {
    pub revenue: BoxOfficeRevenue,
    pub currency: String,
    pub source: String,
    pub last_updated: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxOfficeRevenue {
    pub worldwide: i64,
    #[serde(rename = "openingWeekendUSA")]
    pub opening_weekend_us: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rating {
    pub movie_id: String,
    pub movie_title: String,
    pub rater_id: String,
    pub value: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Keyset bookmark: the (created_at, id) of the last row on a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovieCursor {
    pub created_at: Timestamp,
    pub id: String,
}

/// Reconciled fields written back after enrichment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SupplementalFields {
    pub distributor: Option<String>,
    pub budget: Option<i64>,
    pub mpa_rating: Option<String>,
    pub box_office: Option<BoxOffice>,
}

/// Conjunctive list predicates, already normalized by the service.
#[derive(Clone, Debug, Default)]
pub struct MovieFilter {
    pub query: Option<String>,
    pub year: Option<i16>,
    pub genre: Option<String>,
    pub distributor: Option<String>,
    pub budget_lte: Option<i64>,
    pub mpa_rating: Option<String>,
}

impl MovieFilter {
    pub fn matches(&self, movie: &Movie) -> bool {
        if let Some(q) = &self.query {
            if !movie.title.to_lowercase().contains(&q.to_lowercase()) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if movie.release_date.year() != year {
                return false;
            }
        }
        if !eq_ignore_case(self.genre.as_deref(), Some(&movie.genre)) {
            return false;
        }
        if !eq_ignore_case(self.distributor.as_deref(), movie.distributor.as_deref()) {
            return false;
        }
        if !eq_ignore_case(self.mpa_rating.as_deref(), movie.mpa_rating.as_deref()) {
            return false;
        }
        if let Some(ceiling) = self.budget_lte {
            match movie.budget {
                Some(budget) if budget <= ceiling => {},
                _ => return false,
            }
        }
        true
    }
}

fn eq_ignore_case(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => wanted.to_lowercase() == actual.to_lowercase(),
        (Some(_), None) => false,
    }
}

#[derive(Clone, Debug, Default)]
pub struct CreateMovieParams {
    pub title: String,
    pub genre: String,
    pub release_date: String,
    pub distributor: Option<String>,
    pub budget: Option<i64>,
    pub mpa_rating: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ListMoviesParams {
    pub q: String,
    pub year: Option<i16>,
    pub genre: Option<String>,
    pub distributor: Option<String>,
    pub budget_lte: Option<i64>,
    pub mpa_rating: Option<String>,
    pub limit: i64,
    pub cursor: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MoviePage {
    pub items: Vec<Movie>,
    pub next_cursor: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregatedRating {
    pub average: f64,
    pub count: u64,
}
