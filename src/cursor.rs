//! Opaque continuation tokens for keyset pagination.
//!
//! A token is the URL-safe, unpadded base64 of a small JSON envelope holding the
//! `createdAt` and `id` of the last row served.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::MovieCursor;

#[derive(Debug, thiserror::Error)]
#[error("invalid cursor")]
pub struct InvalidCursor;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    created_at: Option<Timestamp>,
    #[serde(default)]
    id: Option<String>,
}

pub fn encode(cursor: &MovieCursor) -> String {
    let envelope = Envelope { created_at: Some(cursor.created_at), id: Some(cursor.id.clone()) };
    // Serializing a timestamp and a string cannot fail.
    let raw = serde_json::to_vec(&envelope).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(raw)
}

pub fn decode(token: &str) -> Result<MovieCursor, InvalidCursor> {
    let raw = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| InvalidCursor)?;
    let envelope: Envelope = serde_json::from_slice(&raw).map_err(|_| InvalidCursor)?;

    let created_at = envelope.created_at.filter(|ts| *ts != Timestamp::UNIX_EPOCH);
    let id = envelope.id.filter(|id| !id.trim().is_empty());
    match (created_at, id) {
        (Some(created_at), Some(id)) => Ok(MovieCursor { created_at, id }),
        _ => Err(InvalidCursor),
    }
}
