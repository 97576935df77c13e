//! One observation of what is currently playing.

use std::fmt;

use crate::protocol::player::{Image, Playback};

/// Width of the preferred cover variant in pixels.
pub const COVER_WIDTH: u32 = 64;

/// What was playing at the time of a fetch.
///
/// Created fresh on every successful fetch and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub cover_url: Option<String>,

    /// When the track ends, in seconds since the epoch.
    ///
    /// Absolute rather than remaining so that it stays valid while the poll
    /// loop sleeps.
    pub ends_at: Option<f64>,
}

impl Snapshot {
    /// Builds a snapshot from the playback state at time `now`.
    ///
    /// Returns `None` when playback is paused or stopped, or when nothing
    /// with metadata is playing (an advertisement, for instance).
    #[must_use]
    pub fn from_playback(playback: &Playback, now: f64) -> Option<Self> {
        if !playback.is_playing {
            return None;
        }

        let item = playback.item.as_ref()?;

        #[expect(clippy::cast_precision_loss)]
        let ends_at = match (item.duration_ms, playback.progress_ms) {
            (Some(duration), Some(progress)) => {
                let remaining_ms = duration as f64 - progress as f64;
                Some(now + remaining_ms / 1000.0)
            }
            _ => None,
        };

        Some(Self {
            track_id: item.identity().to_owned(),
            artist: item.artist_names(),
            title: item.name.clone(),
            cover_url: select_cover(item.images()),
            ends_at,
        })
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.title, self.artist)
    }
}

/// Picks the cover image to link to.
///
/// Prefers the variant exactly [`COVER_WIDTH`] pixels wide. Otherwise takes
/// the last image in the list, which is the smallest one in the order the
/// Web API returns them.
#[must_use]
pub fn select_cover(images: &[Image]) -> Option<String> {
    images
        .iter()
        .find(|image| image.width == Some(COVER_WIDTH))
        .or_else(|| images.last())
        .map(|image| image.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::player::{Album, Artist, Item};

    fn images(widths: &[u32]) -> Vec<Image> {
        widths
            .iter()
            .map(|&width| Image {
                url: format!("https://i.scdn.co/image/{width}"),
                width: Some(width),
                height: Some(width),
            })
            .collect()
    }

    fn playback(is_playing: bool, progress_ms: Option<u64>) -> Playback {
        Playback {
            is_playing,
            progress_ms,
            currently_playing_type: Some("track".to_owned()),
            item: Some(Item {
                id: Some("4uLU6hMCjMI75M1A2tKUQC".to_owned()),
                uri: None,
                name: "Never Gonna Give You Up".to_owned(),
                duration_ms: Some(213_000),
                artists: vec![Artist {
                    name: "Rick Astley".to_owned(),
                }],
                album: Some(Album {
                    images: images(&[640, 300, 64]),
                }),
            }),
        }
    }

    #[test]
    fn prefers_exact_cover_width() {
        assert_eq!(
            select_cover(&images(&[32, 64, 128])).as_deref(),
            Some("https://i.scdn.co/image/64")
        );
    }

    #[test]
    fn falls_back_to_last_cover() {
        assert_eq!(
            select_cover(&images(&[32, 128])).as_deref(),
            Some("https://i.scdn.co/image/128")
        );
        assert_eq!(select_cover(&[]), None);
    }

    #[test]
    fn builds_snapshot_with_absolute_end() {
        let snapshot = Snapshot::from_playback(&playback(true, Some(200_000)), 1_000.0).unwrap();

        assert_eq!(snapshot.track_id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(snapshot.artist, "Rick Astley");
        assert_eq!(snapshot.title, "Never Gonna Give You Up");
        assert_eq!(
            snapshot.cover_url.as_deref(),
            Some("https://i.scdn.co/image/64")
        );
        assert_eq!(snapshot.ends_at, Some(1_013.0));
    }

    #[test]
    fn unknown_progress_has_no_end() {
        let snapshot = Snapshot::from_playback(&playback(true, None), 1_000.0).unwrap();
        assert_eq!(snapshot.ends_at, None);
    }

    #[test]
    fn paused_playback_is_nothing() {
        assert_eq!(
            Snapshot::from_playback(&playback(false, Some(1_000)), 1_000.0),
            None
        );
    }

    #[test]
    fn playback_without_item_is_nothing() {
        let mut playback = playback(true, Some(1_000));
        playback.item = None;
        assert_eq!(Snapshot::from_playback(&playback, 1_000.0), None);
    }
}
