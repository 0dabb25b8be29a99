//! Spotify Web API client
//!
//! Thin wrapper over reqwest providing the capabilities the backup core
//! consumes: drained paginated fetches, batched track lookups, the
//! recently-played feed and playlist create/add.

use crate::api::auth::Authenticator;
use crate::api::model::{PlayHistoryItem, SavedKind, TimeRange, TopKind, TrackData};
use crate::{Error, Result};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("spotify-backup/", env!("CARGO_PKG_VERSION"));

/// Maximum ids per batched track lookup. The API documentation claims 100,
/// but the endpoint rejects more than 50.
pub const TRACK_LOOKUP_BATCH: usize = 50;

/// Maximum items per playlist-add call
const PLAYLIST_ADD_CHUNK: usize = 100;

pub struct SpotifyClient {
    http: reqwest::Client,
    auth: Authenticator,
    user_id: String,
}

impl SpotifyClient {
    /// Build the client and resolve the current user's id
    pub async fn connect() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        let auth = Authenticator::new(http.clone())?;

        let mut client = Self {
            http,
            auth,
            user_id: String::new(),
        };
        let me = client.get(&client.endpoint("me")?).await?;
        client.user_id = me["id"]
            .as_str()
            .ok_or_else(|| Error::Auth("Profile response contained no user id".to_string()))?
            .to_string();
        debug!("Authenticated as user {}", client.user_id);
        Ok(client)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{API_BASE}/{path}"))
            .map_err(|e| Error::InvalidInput(format!("Invalid endpoint {path}: {e}")))
    }

    async fn get(&self, url: &Url) -> Result<Value> {
        let token = self.auth.access_token().await?;
        let response = self.http.get(url.clone()).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn post(&self, url: &Url, body: &Value) -> Result<Value> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Drain a paginated result set into a single ordered item list.
    ///
    /// The paging object may sit at the response root or nested one level
    /// down (the followed-artists endpoint wraps it in `artists`).
    pub async fn get_all_items(&self, url: Url) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let response = self.get(&url).await?;
            let paging = locate_paging(&response).ok_or_else(|| {
                Error::Api {
                    status: 200,
                    message: format!("No paging object in response from {url}"),
                }
            })?;
            if let Some(page_items) = paging["items"].as_array() {
                items.extend(page_items.iter().cloned());
            }
            next = paging["next"]
                .as_str()
                .map(Url::parse)
                .transpose()
                .map_err(|e| Error::InvalidInput(format!("Invalid next URL: {e}")))?;
        }

        Ok(items)
    }

    /// The "recently played" feed, newest ≤ 50 events.
    ///
    /// `after_ms` is forwarded but known to be unreliable upstream; the
    /// ledger's insert-or-ignore semantics are the actual dedup boundary.
    pub async fn recently_played(&self, after_ms: Option<i64>) -> Result<Vec<PlayHistoryItem>> {
        let mut url = self.endpoint("me/player/recently-played")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", "50");
            if let Some(after) = after_ms {
                query.append_pair("after", &after.to_string());
            }
        }

        let raw = self.get_all_items(url).await?;
        let mut items = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<PlayHistoryItem>(value) {
                Ok(item) => items.push(item),
                // Podcast episodes and similar entries lack a track object
                Err(e) => debug!("Skipping unparseable play-history entry: {e}"),
            }
        }
        Ok(items)
    }

    /// Batched track metadata lookup; at most [`TRACK_LOOKUP_BATCH`] ids
    pub async fn fetch_tracks(&self, ids: &[String]) -> Result<Vec<TrackData>> {
        if ids.len() > TRACK_LOOKUP_BATCH {
            return Err(Error::InvalidInput(format!(
                "fetch_tracks called with {} ids (max {})",
                ids.len(),
                TRACK_LOOKUP_BATCH
            )));
        }
        let mut url = self.endpoint("tracks")?;
        url.query_pairs_mut().append_pair("ids", &ids.join(","));

        let response = self.get(&url).await?;
        let tracks = response["tracks"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            // Unknown ids come back as null entries
            .filter(|v| !v.is_null())
            .filter_map(|v| match serde_json::from_value::<TrackData>(v) {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!("Skipping unparseable track object: {e}");
                    None
                }
            })
            .collect();
        Ok(tracks)
    }

    /// All playlists of the current user
    pub async fn current_user_playlists(&self) -> Result<Vec<Value>> {
        self.get_all_items(self.endpoint("me/playlists")?).await
    }

    /// A full playlist object with its track pages drained in order
    pub async fn playlist(&self, playlist_id: &str) -> Result<Value> {
        let mut playlist = self
            .get(&self.endpoint(&format!("playlists/{playlist_id}"))?)
            .await?;

        let mut all_items = playlist["tracks"]["items"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let mut next = playlist["tracks"]["next"]
            .as_str()
            .map(|s| s.to_string());

        while let Some(next_url) = next.take() {
            let url = Url::parse(&next_url)
                .map_err(|e| Error::InvalidInput(format!("Invalid next URL: {e}")))?;
            let page = self.get(&url).await?;
            if let Some(items) = page["items"].as_array() {
                all_items.extend(items.iter().cloned());
            }
            next = page["next"].as_str().map(|s| s.to_string());
        }

        playlist["tracks"]["items"] = Value::Array(all_items);
        playlist["tracks"]["next"] = Value::Null;
        Ok(playlist)
    }

    /// Saved library items of one category
    pub async fn saved_items(&self, kind: SavedKind) -> Result<Vec<Value>> {
        let mut url = self.endpoint(kind.endpoint())?;
        url.query_pairs_mut().append_pair("limit", "50");
        self.get_all_items(url).await
    }

    /// Top items of one category over one time range
    pub async fn top_items(&self, kind: TopKind, range: TimeRange) -> Result<Vec<Value>> {
        let mut url = self.endpoint(kind.endpoint())?;
        url.query_pairs_mut()
            .append_pair("time_range", range.as_str())
            .append_pair("limit", "50");
        self.get_all_items(url).await
    }

    /// Artists the current user follows
    pub async fn followed_artists(&self) -> Result<Vec<Value>> {
        let mut url = self.endpoint("me/following")?;
        url.query_pairs_mut()
            .append_pair("type", "artist")
            .append_pair("limit", "50");
        self.get_all_items(url).await
    }

    /// Create a private, non-collaborative playlist for the current user
    pub async fn create_playlist(&self, name: &str, description: &str) -> Result<Value> {
        let url = self.endpoint(&format!("users/{}/playlists", self.user_id))?;
        let body = serde_json::json!({
            "name": name,
            "public": false,
            "collaborative": false,
            "description": description,
        });
        self.post(&url, &body).await
    }

    /// Add tracks to a playlist, 100 per request, preserving order
    pub async fn add_items_to_playlist(&self, playlist_id: &str, ids: &[String]) -> Result<()> {
        let url = self.endpoint(&format!("playlists/{playlist_id}/tracks"))?;
        let total = ids.len();
        let mut count = 0;

        for chunk in ids.chunks(PLAYLIST_ADD_CHUNK) {
            let uris: Vec<String> = chunk.iter().map(|id| to_track_uri(id)).collect();
            let body = serde_json::json!({ "uris": uris });
            self.post(&url, &body).await?;
            count += chunk.len();
            info!("Copied {} of {} tracks", count, total);
        }
        Ok(())
    }
}

/// Find the paging object in a response: either the root itself or the
/// first object value that carries an `items` array
fn locate_paging(response: &Value) -> Option<&Value> {
    if response["items"].is_array() {
        return Some(response);
    }
    response
        .as_object()?
        .values()
        .find(|v| v["items"].is_array())
}

/// Accept bare track ids as well as full URIs
fn to_track_uri(id: &str) -> String {
    if id.contains(':') {
        id.to_string()
    } else {
        format!("spotify:track:{id}")
    }
}
