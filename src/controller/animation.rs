use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace, warn};

use crate::config::AnimationConfig;
use crate::model::{CharacterStateId, EntityId};

/// Cross-fade used when a state change starts a new clip.
pub const DEFAULT_FADE: f32 = 0.1;

/// Used when a clip is missing from the provider.
pub const FALLBACK_CLIP_LENGTH: f32 = 1.0;

/// Source of clip lengths and sink for clip playback.
///
/// The simulation only needs lengths to time its states; playback is a
/// notification for whatever drives the skeletons.
pub trait AnimationProvider {
    fn clip_length(&self, clip: &str) -> Option<f32>;

    fn play(&mut self, entity: EntityId, clip: &str, fade: f32);

    /// The entity is gone; drop anything kept for it.
    fn forget(&mut self, _entity: EntityId) {}
}

/// Length of the clip a state plays. Missing, zero or non-finite lengths
/// fall back to [`FALLBACK_CLIP_LENGTH`].
pub fn state_duration(provider: &dyn AnimationProvider, state: CharacterStateId) -> f32 {
    let clip = state.animation();
    match provider.clip_length(clip) {
        Some(length) if length.is_finite() && length > 0.0 => length,
        Some(length) => {
            warn!(clip, length, "unusable animation clip length, using fallback");
            FALLBACK_CLIP_LENGTH
        }
        None => {
            debug!(clip, "missing animation clip, using fallback length");
            FALLBACK_CLIP_LENGTH
        }
    }
}

/// Clip lengths from configuration, remembering what each entity plays.
#[derive(Debug, Clone, Default)]
pub struct ClipTable {
    lengths: BTreeMap<String, f32>,
    playing: HashMap<EntityId, String>,
}

impl ClipTable {
    pub fn from_config(config: &AnimationConfig) -> Self {
        Self {
            lengths: config.0.clone(),
            playing: HashMap::new(),
        }
    }

    pub fn current(&self, entity: EntityId) -> Option<&str> {
        self.playing.get(&entity).map(String::as_str)
    }
}

impl AnimationProvider for ClipTable {
    fn clip_length(&self, clip: &str) -> Option<f32> {
        self.lengths.get(clip).copied()
    }

    fn play(&mut self, entity: EntityId, clip: &str, fade: f32) {
        trace!(%entity, clip, fade, "play clip");
        self.playing.insert(entity, clip.to_string());
    }

    fn forget(&mut self, entity: EntityId) {
        self.playing.remove(&entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_has_a_configured_clip() {
        let table = ClipTable::from_config(&AnimationConfig::default());
        for state in CharacterStateId::ALL {
            assert!(table.clip_length(state.animation()).is_some(), "{state:?} has no clip");
        }
    }

    #[test]
    fn missing_clip_uses_fallback() {
        let table = ClipTable::default();
        assert_eq!(state_duration(&table, CharacterStateId::Walk), FALLBACK_CLIP_LENGTH);
    }

    #[test]
    fn bad_clip_lengths_use_fallback() {
        for length in [0.0, -0.5, f32::NAN, f32::INFINITY] {
            let mut config = AnimationConfig::default();
            config.0.insert(CharacterStateId::Walk.animation().to_string(), length);
            let table = ClipTable::from_config(&config);
            assert_eq!(state_duration(&table, CharacterStateId::Walk), FALLBACK_CLIP_LENGTH, "length {length}");
        }
    }

    #[test]
    fn play_tracks_current_clip_until_forgotten() {
        let mut table = ClipTable::default();
        table.play(EntityId(1), "walk", DEFAULT_FADE);
        assert_eq!(table.current(EntityId(1)), Some("walk"));
        table.forget(EntityId(1));
        assert_eq!(table.current(EntityId(1)), None);
    }
}
