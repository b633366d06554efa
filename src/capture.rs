use anyhow::Result;
use async_trait::async_trait;

/// A downscaled, compressed screen grab ready for the vision model.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Opaque reference recorded alongside analysis results (a temp-file
    /// path in the default shell).
    pub reference: String,
    /// JPEG bytes of the capture.
    pub data: Vec<u8>,
}

/// Produces a snapshot on demand. Implemented by the platform shell;
/// capture failure is non-fatal to the caller (the tick is skipped).
#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    async fn capture(&self) -> Result<Snapshot>;
}
