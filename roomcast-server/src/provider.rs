//! Track metadata provider
//!
//! Upstream catalog access: full track detail (streaming URL, lyric, cover,
//! hot comment) and station playlists for auto mode. No retry/backoff here;
//! failures surface as transient `Error::Provider` for callers to handle.

use crate::error::{Error, Result};
use async_trait::async_trait;
use roomcast_common::model::{StationKind, TrackDetail};
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait TrackProvider: Send + Sync {
    /// Fetch full detail for one track
    async fn fetch_track_detail(&self, track_id: &str) -> Result<TrackDetail>;

    /// Fetch the track-id list for a station (auto-mode source)
    async fn fetch_station_playlist(&self, station: StationKind) -> Result<Vec<String>>;
}

/// JSON body returned by the upstream catalog
#[derive(Debug, Deserialize)]
struct UpstreamTrack {
    id: String,
    name: String,
    artist: String,
    duration_seconds: f64,
    src: String,
    lyric: Option<String>,
    pic: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamPlaylist {
    track_ids: Vec<String>,
}

/// HTTP catalog client
pub struct HttpTrackProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrackProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn station_path(station: StationKind) -> &'static str {
        match station {
            StationKind::Hot => "hot",
            StationKind::Emerging => "emerging",
        }
    }
}

#[async_trait]
impl TrackProvider for HttpTrackProvider {
    async fn fetch_track_detail(&self, track_id: &str) -> Result<TrackDetail> {
        let url = format!("{}/tracks/{}", self.base_url, track_id);
        debug!("Fetching track detail from {}", url);

        let track: UpstreamTrack = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("fetch {}: {}", track_id, e)))?
            .error_for_status()
            .map_err(|e| Error::Provider(format!("fetch {}: {}", track_id, e)))?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("decode {}: {}", track_id, e)))?;

        Ok(TrackDetail {
            id: track.id,
            name: track.name,
            artist: track.artist,
            duration_seconds: track.duration_seconds,
            src: track.src,
            lyric: track.lyric,
            pic: track.pic,
            comment: track.comment,
        })
    }

    async fn fetch_station_playlist(&self, station: StationKind) -> Result<Vec<String>> {
        let url = format!("{}/stations/{}", self.base_url, Self::station_path(station));
        debug!("Fetching station playlist from {}", url);

        let playlist: UpstreamPlaylist = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("station {:?}: {}", station, e)))?
            .error_for_status()
            .map_err(|e| Error::Provider(format!("station {:?}: {}", station, e)))?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("station decode {:?}: {}", station, e)))?;

        Ok(playlist.track_ids)
    }
}

/// Fixed catalog for tests and local demos
#[derive(Default)]
pub struct StaticTrackProvider {
    tracks: std::collections::HashMap<String, TrackDetail>,
    station: Vec<String>,
}

impl StaticTrackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, track: TrackDetail) -> Self {
        self.tracks.insert(track.id.clone(), track);
        self
    }

    pub fn with_station(mut self, track_ids: Vec<String>) -> Self {
        self.station = track_ids;
        self
    }
}

#[async_trait]
impl TrackProvider for StaticTrackProvider {
    async fn fetch_track_detail(&self, track_id: &str) -> Result<TrackDetail> {
        self.tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("unknown track {}", track_id)))
    }

    async fn fetch_station_playlist(&self, _station: StationKind) -> Result<Vec<String>> {
        Ok(self.station.clone())
    }
}
