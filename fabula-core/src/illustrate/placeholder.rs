//! Placeholder illustrator.
//!
//! Resolves after a fixed delay with a deterministic stock-image URL seeded
//! by the scene id, letting hosts exercise the full dispatch/merge path
//! without a real generation service.

use std::time::Duration;

use async_trait::async_trait;

use super::Illustrator;
use crate::error::Result;
use crate::scene::{ImageRef, SceneId};

pub struct PlaceholderIllustrator {
    delay: Duration,
}

impl PlaceholderIllustrator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for PlaceholderIllustrator {
    fn default() -> Self {
        // Roughly the latency of a real generation round trip.
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Illustrator for PlaceholderIllustrator {
    async fn request(&self, scene: SceneId, _text: &str) -> Result<ImageRef> {
        tokio::time::sleep(self.delay).await;
        Ok(ImageRef(format!(
            "https://picsum.photos/800/600?random={scene}"
        )))
    }
}
