//! Illustration-generation boundary.
//!
//! One request per qualifying scene, no concurrency limit — real-world
//! request volume is bounded by human speech rate. Failures resolve to
//! `Err`, never panics, and never affect sibling scenes.

pub mod http;
pub mod placeholder;

pub use http::{HttpIllustrator, HttpIllustratorConfig};
pub use placeholder::PlaceholderIllustrator;

use async_trait::async_trait;

use crate::error::Result;
use crate::scene::{ImageRef, SceneId};

/// Trait for illustration services.
///
/// Results may arrive in any order relative to request order; the orchestrator
/// merges them back by scene identity.
#[async_trait]
pub trait Illustrator: Send + Sync + 'static {
    /// Request one illustration for `scene`, prompted by its text.
    async fn request(&self, scene: SceneId, text: &str) -> Result<ImageRef>;
}
