//! Playback state of the current user.
//!
//! Returned by `GET /v1/me/player`. When no device is active the endpoint
//! answers `204 No Content` without a body.
//!
//! # Wire Format
//!
//! Only the fields this crate reads are modelled:
//! ```json
//! {
//!     "is_playing": true,
//!     "progress_ms": 48120,
//!     "currently_playing_type": "track",
//!     "item": {
//!         "id": "4uLU6hMCjMI75M1A2tKUQC",
//!         "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
//!         "name": "Never Gonna Give You Up",
//!         "duration_ms": 213573,
//!         "artists": [{ "name": "Rick Astley" }],
//!         "album": {
//!             "images": [
//!                 { "url": "https://i.scdn.co/image/ab67616d0000b273", "width": 640, "height": 640 },
//!                 { "url": "https://i.scdn.co/image/ab67616d00001e02", "width": 300, "height": 300 },
//!                 { "url": "https://i.scdn.co/image/ab67616d00004851", "width": 64, "height": 64 }
//!             ]
//!         }
//!     }
//! }
//! ```
//!
//! `item` is `null` while an advertisement plays. Local files have a `null`
//! id and images without dimensions.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Playback {
    #[serde(default)]
    pub is_playing: bool,

    #[serde(default)]
    pub progress_ms: Option<u64>,

    #[serde(default)]
    pub currently_playing_type: Option<String>,

    #[serde(default)]
    pub item: Option<Item>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub uri: Option<String>,

    pub name: String,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde(default)]
    pub album: Option<Album>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Image {
    pub url: String,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,
}

impl Item {
    /// Identifier that distinguishes this item from the previous one.
    ///
    /// Falls back to the URI and then the name for items without id, such
    /// as local files.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.id
            .as_deref()
            .or(self.uri.as_deref())
            .unwrap_or(&self.name)
    }

    /// Artist names joined with `", "`.
    #[must_use]
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[must_use]
    pub fn images(&self) -> &[Image] {
        self.album
            .as_ref()
            .map(|album| album.images.as_slice())
            .unwrap_or_default()
    }
}
