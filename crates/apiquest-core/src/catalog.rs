//! Read-only quest tracks, shared across sessions.

use std::sync::Arc;

use anyhow::{Context, Result};
use apiquest_schema::{Quest, Track};

const BUILTIN_TRACKS: &str = include_str!("../tracks/builtin.yaml");

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Arc<Track>>,
}

impl Catalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks: tracks.into_iter().map(Arc::new).collect(),
        }
    }

    /// The python, nodejs and java tracks shipped with the binary.
    pub fn builtin() -> Result<Self> {
        let tracks: Vec<Track> =
            serde_yaml::from_str(BUILTIN_TRACKS).context("failed to parse built-in tracks")?;
        Ok(Self::new(tracks))
    }

    /// Merge extra tracks. A track whose id already exists replaces it in place.
    pub fn with_tracks(mut self, extra: Vec<Track>) -> Self {
        for track in extra {
            match self.tracks.iter_mut().find(|t| t.id == track.id) {
                Some(slot) => {
                    tracing::info!(track_id = %track.id, "replacing built-in track");
                    *slot = Arc::new(track);
                }
                None => self.tracks.push(Arc::new(track)),
            }
        }
        self
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<Arc<Track>> {
        self.tracks.iter().find(|t| t.id == id).cloned()
    }

    pub fn find_quest(&self, quest_id: &str) -> Option<(Arc<Track>, &Quest)> {
        self.tracks
            .iter()
            .find_map(|t| t.quest(quest_id).map(|q| (t.clone(), q)))
    }
}
