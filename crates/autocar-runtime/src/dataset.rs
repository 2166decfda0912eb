//! Training dataset persistence.
//!
//! Frames recorded in training mode are cropped (the top rows only show the
//! horizon) and written as JPEG files whose name carries the label, e.g.
//! `frame_12_gas_0.5_dir_-1.0.jpg`.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use autocar_types::{CROP_TOP_ROWS, CameraFrame, CarError, TrainingLabel};
use image::{ImageBuffer, RgbImage};
use tracing::debug;

/// JPEG quality used for dataset images.
pub const JPEG_QUALITY: u8 = 90;

/// Destination for labelled training frames.
pub trait DatasetSink: Send {
    /// Persist `frame` under `label`.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Dataset`] when the frame cannot be encoded or
    /// written. The capture loop logs the error and keeps going.
    fn save(&mut self, frame: &CameraFrame, label: &TrainingLabel) -> Result<(), CarError>;
}

/// Writes cropped JPEG frames into a session folder.
pub struct JpegDataset {
    dir: PathBuf,
    crop_rows: u32,
    quality: u8,
}

impl JpegDataset {
    /// Dataset rooted at `dir`, which must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            crop_rows: CROP_TOP_ROWS,
            quality: JPEG_QUALITY,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a frame with `label` is written to.
    pub fn path_for(&self, label: &TrainingLabel) -> PathBuf {
        self.dir.join(format!("{}.jpg", label.file_stem()))
    }
}

impl DatasetSink for JpegDataset {
    fn save(&mut self, frame: &CameraFrame, label: &TrainingLabel) -> Result<(), CarError> {
        let cropped = frame.crop_top(self.crop_rows);
        let jpeg = encode_rgb_to_jpeg(&cropped, self.quality)?;
        let path = self.path_for(label);
        std::fs::write(&path, jpeg)
            .map_err(|e| CarError::Dataset(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "saved training frame");
        Ok(())
    }
}

/// Sink that discards every frame, used when no dataset folder is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardDataset;

impl DatasetSink for DiscardDataset {
    fn save(&mut self, _frame: &CameraFrame, label: &TrainingLabel) -> Result<(), CarError> {
        debug!(frame = label.index, "no dataset configured; frame dropped");
        Ok(())
    }
}

fn encode_rgb_to_jpeg(frame: &CameraFrame, quality: u8) -> Result<Vec<u8>, CarError> {
    let expected_len = frame.width as usize * frame.height as usize * CameraFrame::CHANNELS;
    if frame.data.len() < expected_len {
        return Err(CarError::Dataset(format!(
            "frame holds {} bytes, {}x{} RGB needs {expected_len}",
            frame.data.len(),
            frame.width,
            frame.height
        )));
    }

    let img: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, frame.data[..expected_len].to_vec())
            .ok_or_else(|| CarError::Dataset("frame buffer does not match its size".to_string()))?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| CarError::Dataset(format!("jpeg encoding failed: {e}")))?;
    Ok(buf.into_inner())
}
