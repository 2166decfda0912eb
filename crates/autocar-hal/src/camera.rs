//! Generic `Camera` trait for the frame source that feeds the capture loop.

use autocar_types::{CameraFrame, CarError};

/// Frame width delivered by every camera driver.
pub const CAM_WIDTH: u32 = 250;
/// Frame height delivered by every camera driver.
pub const CAM_HEIGHT: u32 = 150;

/// A camera or image-capture device.
///
/// `capture` blocks until the next frame is available; the configured frame
/// rate is a hint to the driver, the capture loop simply runs as fast as
/// frames arrive.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"front"`.
    fn id(&self) -> &str;

    /// Block until the next frame is available and return it.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Camera`] if the device is gone or the frame cannot
    /// be read. The capture loop treats this as fatal.
    fn capture(&mut self) -> Result<CameraFrame, CarError>;
}
