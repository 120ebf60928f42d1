//! The storyboard data model.

pub mod export;
pub mod tone;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use tone::Tone;

/// Opaque scene identifier, assigned at creation, never reused within a
/// session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SceneId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// Reference to a generated illustration. The format (URL, path, handle) is
/// defined by the illustration service; the core only carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One finalized spoken utterance plus its derived tone and optional
/// illustration.
///
/// Scenes are append-only during a session and totally ordered by creation;
/// `loudness` and `tone` are frozen at creation, and `image_ref` transitions
/// at most once, from absent to present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    /// Finalized utterance text, trimmed, never empty.
    pub text: String,
    /// Set once when the illustration request resolves; stays `None` forever
    /// for scenes below the illustration threshold or after a failed request.
    pub image_ref: Option<ImageRef>,
    /// Wall-clock creation time, for display and duration math. List order
    /// is the authoritative total order.
    pub created_at: DateTime<Utc>,
    /// Loudness in [0, 1] sampled at the instant the transcript finalized.
    pub loudness: f32,
    /// Derived once from `loudness` at creation — never recomputed.
    pub tone: Tone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_serializes_with_camel_case_fields() {
        let scene = Scene {
            id: SceneId(3),
            text: "A gentle breeze blew.".into(),
            image_ref: Some(ImageRef("https://example.com/3.png".into())),
            created_at: Utc::now(),
            loudness: 0.2,
            tone: Tone::Calm,
        };

        let json = serde_json::to_value(&scene).expect("serialize scene");
        assert_eq!(json["id"], 3);
        assert_eq!(json["text"], "A gentle breeze blew.");
        assert_eq!(json["imageRef"], "https://example.com/3.png");
        assert_eq!(json["tone"], "calm");
        assert!(json["createdAt"].is_string());

        let round_trip: Scene = serde_json::from_value(json).expect("deserialize scene");
        assert_eq!(round_trip.id, SceneId(3));
        assert_eq!(round_trip.tone, Tone::Calm);
    }

    #[test]
    fn unillustrated_scene_has_null_image_ref() {
        let scene = Scene {
            id: SceneId(0),
            text: "ok".into(),
            image_ref: None,
            created_at: Utc::now(),
            loudness: 0.5,
            tone: Tone::Mysterious,
        };
        let json = serde_json::to_value(&scene).expect("serialize scene");
        assert!(json["imageRef"].is_null());
    }

    #[test]
    fn scene_id_displays_with_prefix() {
        assert_eq!(SceneId(7).to_string(), "scene-7");
    }
}
