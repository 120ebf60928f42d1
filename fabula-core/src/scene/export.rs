//! Pure export transforms over the scene list.
//!
//! Both functions are read-only conveniences for hosts (download / share
//! actions); they never touch pipeline state.

use super::Scene;

/// Serialize the storyboard to a flat-text document:
///
/// ```text
/// Scene 1 (calm):
/// A gentle breeze blew.
///
/// Scene 2 (excited):
/// RUN NOW!
/// ```
pub fn story_document(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .enumerate()
        .map(|(i, scene)| format!("Scene {} ({}):\n{}\n", i + 1, scene.tone, scene.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenate scene texts into a single shareable string.
pub fn share_text(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .map(|scene| scene.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
