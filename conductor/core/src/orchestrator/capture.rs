//! Screenshot collaborator
//!
//! Pixel capture lives outside the core. The orchestrator hands a
//! [`ScreenCapture`] the session snapshot and mode and gets back the location
//! of the saved image.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;

use super::session::SessionRecord;
use crate::command::ScreenshotMode;

/// Captures screenshots
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture according to `mode`
    ///
    /// `session` is set for [`ScreenshotMode::Session`] captures.
    async fn capture(
        &self,
        session: Option<&SessionRecord>,
        mode: ScreenshotMode,
    ) -> anyhow::Result<PathBuf>;
}

/// Capture stand-in that only computes the file path it would write
#[derive(Clone, Debug)]
pub struct SimulatedCapture {
    output_dir: PathBuf,
}

impl SimulatedCapture {
    /// Create a capture rooted at `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl Default for SimulatedCapture {
    fn default() -> Self {
        let dir = dirs::picture_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("rdp-conductor")
            .join("screenshots");
        Self::new(dir)
    }
}

#[async_trait]
impl ScreenCapture for SimulatedCapture {
    async fn capture(
        &self,
        session: Option<&SessionRecord>,
        mode: ScreenshotMode,
    ) -> anyhow::Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let file_name = match (mode, session) {
            (ScreenshotMode::Session, Some(record)) => {
                format!("Session_{}_{stamp}.png", sanitize(&record.display_name()))
            }
            (ScreenshotMode::Session, None) => {
                anyhow::bail!("Session capture requires a session")
            }
            (ScreenshotMode::Application, _) => format!("App_{stamp}.png"),
            (ScreenshotMode::Fullscreen, _) => format!("Fullscreen_{stamp}.png"),
        };
        Ok(self.output_dir.join(file_name))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::session::{ConnectionRequest, SessionId};

    #[tokio::test]
    async fn test_capture_paths_per_mode() {
        let capture = SimulatedCapture::new("/tmp/shots");
        let record = SessionRecord::from_request(
            SessionId::new(),
            &ConnectionRequest::new("srv.example.com"),
        );

        let session = capture
            .capture(Some(&record), ScreenshotMode::Session)
            .await
            .unwrap();
        let app = capture
            .capture(None, ScreenshotMode::Application)
            .await
            .unwrap();
        let full = capture
            .capture(None, ScreenshotMode::Fullscreen)
            .await
            .unwrap();

        assert!(session.to_string_lossy().contains("Session_srv_example_com"));
        assert!(app.to_string_lossy().contains("App_"));
        assert!(full.to_string_lossy().contains("Fullscreen_"));
        assert!(session.starts_with("/tmp/shots"));
    }

    #[tokio::test]
    async fn test_session_capture_needs_session() {
        let capture = SimulatedCapture::new("/tmp/shots");
        assert!(capture.capture(None, ScreenshotMode::Session).await.is_err());
    }
}
