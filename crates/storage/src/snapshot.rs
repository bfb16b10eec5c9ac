//! JPEG snapshot persistence

use crate::StorageError;
use alerting::AlertEvent;
use image::codecs::jpeg::JpegEncoder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Writes alert frames as JPEG files into a single directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    quality: u8,
}

impl SnapshotStore {
    /// The directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{category}_{YYYYmmdd_HHMMSS}_{subject}_{id8}.jpg`
    ///
    /// The event id suffix keeps concurrent captures from colliding.
    pub fn file_name(event: &AlertEvent) -> String {
        let subject: String = event
            .subject_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let id = event.id.simple().to_string();

        format!(
            "{}_{}_{}_{}.jpg",
            event.category,
            event.triggered_at.format("%Y%m%d_%H%M%S"),
            subject,
            &id[..8]
        )
    }

    /// Decode the event's frame and save it as JPEG
    ///
    /// Returns `Ok(None)` when the frame carries no image data.
    pub fn save(&self, event: &AlertEvent) -> Result<Option<PathBuf>, StorageError> {
        let Some(bytes) = event.snapshot.image() else {
            debug!("No image for {} alert {}, skipping snapshot", event.category, event.id);
            return Ok(None);
        };

        let frame = image::load_from_memory(bytes)?.to_rgb8();
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(Self::file_name(event));
        let writer = BufWriter::new(File::create(&path)?);
        frame.write_with_encoder(JpegEncoder::new_with_quality(writer, self.quality))?;

        info!("Saved alert snapshot: {}", path.display());
        Ok(Some(path))
    }
}
