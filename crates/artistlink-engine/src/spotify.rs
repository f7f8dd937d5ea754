//! HTTP collaboration source backed by the Spotify Web API.
//!
//! Collaborators are not exposed directly by the API. They are derived from
//! album track listings: every artist co-credited on a track the subject
//! appears on is a collaborator. Every request goes through the shared
//! [`Throttle`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use artistlink_core::{ArtistId, EntityRecord, StubEntity};

use crate::config::SpotifyConfig;
use crate::error::UpstreamError;
use crate::source::CollaborationSource;
use crate::throttle::Throttle;

/// Albums per page of `/artists/{id}/albums`.
const ALBUM_PAGE_SIZE: usize = 50;
/// Ids per request to `/albums`.
const ALBUM_BATCH_SIZE: usize = 20;
/// Ids per request to `/artists`.
const ARTIST_BATCH_SIZE: usize = 50;
const ALBUM_GROUPS: &str = "single,appears_on,album";
const PREFERRED_ART_WIDTH: u32 = 300;
const DEFAULT_ART: &str = "default";

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Followers {
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    id: String,
    name: String,
    popularity: Option<i32>,
    followers: Option<Followers>,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistsResponse {
    artists: Vec<Option<ArtistObject>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    artists: ArtistPage,
}

#[derive(Debug, Deserialize)]
struct ArtistPage {
    items: Vec<ArtistObject>,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AlbumPage {
    items: Vec<AlbumRef>,
}

#[derive(Debug, Deserialize)]
struct AlbumsResponse {
    albums: Vec<Option<Album>>,
}

#[derive(Debug, Deserialize)]
struct Album {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    #[serde(default)]
    artists: Vec<TrackArtist>,
}

#[derive(Debug, Deserialize)]
struct TrackArtist {
    id: Option<String>,
    name: String,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// [`CollaborationSource`] over the Spotify Web API.
pub struct SpotifySource {
    client: reqwest::Client,
    config: SpotifyConfig,
    throttle: Arc<Throttle>,
}

impl SpotifySource {
    pub fn new(config: SpotifyConfig, throttle: Arc<Throttle>) -> Self {
        SpotifySource {
            client: reqwest::Client::new(),
            config,
            throttle,
        }
    }

    /// Artists matching `name`, best match first.
    pub async fn search_artists(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<EntityRecord>, UpstreamError> {
        let query = [
            ("q", name.trim().to_string()),
            ("type", "artist".to_string()),
            ("limit", limit.to_string()),
        ];
        let response: SearchResponse = self.get_json("search", "search", &query).await?;
        Ok(response.artists.items.into_iter().map(record_from_artist).collect())
    }

    async fn album_ids(&self, id: &ArtistId) -> Result<Vec<String>, UpstreamError> {
        let path = format!("artists/{}/albums", id);
        let mut ids = IndexSet::new();
        let mut offset = 0;
        loop {
            let query = [
                ("limit", ALBUM_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("include_groups", ALBUM_GROUPS.to_string()),
            ];
            let page: AlbumPage = self.get_json("artist_albums", &path, &query).await?;
            let fetched = page.items.len();
            ids.extend(page.items.into_iter().map(|album| album.id));
            debug!(artist = %id, offset, fetched, "fetched album page");
            if fetched < ALBUM_PAGE_SIZE {
                break;
            }
            offset += ALBUM_PAGE_SIZE;
        }
        Ok(ids.into_iter().collect())
    }

    async fn albums(&self, album_ids: &[String]) -> Result<Vec<Album>, UpstreamError> {
        let mut albums = Vec::with_capacity(album_ids.len());
        for chunk in album_ids.chunks(ALBUM_BATCH_SIZE) {
            let query = [("ids", chunk.join(","))];
            let response: AlbumsResponse = self.get_json("albums", "albums", &query).await?;
            albums.extend(response.albums.into_iter().flatten());
        }
        Ok(albums)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        op: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let url = url.as_str();
        self.throttle
            .run(op, move || self.send_once(url, query))
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .query(query)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            return Err(UpstreamError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(UpstreamError::Unavailable {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|err| UpstreamError::Decode(err.to_string()))
    }
}

#[async_trait]
impl CollaborationSource for SpotifySource {
    async fn fetch_collaborators(&self, id: &ArtistId) -> Result<Vec<StubEntity>, UpstreamError> {
        let album_ids = self.album_ids(id).await?;
        let albums = self.albums(&album_ids).await?;
        let collaborators = collaborators_from_albums(&albums, id);
        info!(
            artist = %id,
            albums = albums.len(),
            collaborators = collaborators.len(),
            "fetched collaborators"
        );
        Ok(collaborators)
    }

    async fn fetch_details(&self, ids: &[ArtistId]) -> Result<Vec<EntityRecord>, UpstreamError> {
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ARTIST_BATCH_SIZE) {
            let joined = chunk.iter().map(ArtistId::as_str).collect::<Vec<_>>().join(",");
            let query = [("ids", joined)];
            let response: ArtistsResponse = self.get_json("artists", "artists", &query).await?;
            records.extend(response.artists.into_iter().flatten().map(record_from_artist));
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Co-credited artists on every track `artist` appears on, excluding
/// `artist` itself, deduplicated in first-seen order.
fn collaborators_from_albums(albums: &[Album], artist: &ArtistId) -> Vec<StubEntity> {
    let mut found: IndexMap<String, String> = IndexMap::new();
    let tracks = albums
        .iter()
        .filter_map(|album| album.tracks.as_ref())
        .flat_map(|page| page.items.iter());

    for track in tracks {
        let credited = track
            .artists
            .iter()
            .any(|a| a.id.as_deref() == Some(artist.as_str()));
        if !credited {
            continue;
        }
        for other in &track.artists {
            // Local files have no id.
            let Some(other_id) = other.id.as_deref() else {
                continue;
            };
            if other_id != artist.as_str() {
                found
                    .entry(other_id.to_string())
                    .or_insert_with(|| other.name.clone());
            }
        }
    }

    found
        .into_iter()
        .map(|(id, name)| StubEntity::new(id, name))
        .collect()
}

/// Prefers the 300px image, then the first image, then a placeholder.
fn select_art(images: &[Image]) -> String {
    images
        .iter()
        .find(|image| image.width == Some(PREFERRED_ART_WIDTH))
        .or_else(|| images.first())
        .map(|image| image.url.clone())
        .unwrap_or_else(|| DEFAULT_ART.to_string())
}

fn record_from_artist(artist: ArtistObject) -> EntityRecord {
    let mut record = EntityRecord::new(artist.id, artist.name, artist.popularity.unwrap_or(0))
        .with_genres(artist.genres);
    record.followers = artist.followers.and_then(|f| f.total).unwrap_or(0);
    record.art_url = select_art(&artist.images);
    record
}

/// `Retry-After` in delta-seconds form.
fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}
