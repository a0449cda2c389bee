use image::{imageops, DynamicImage, GrayImage, ImageBuffer, Rgb, Rgba};

use crate::error::FrameError;

/// Clockwise rotation that turns a captured buffer upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl FrameRotation {
    /// Accepts any multiple of 90, negative angles included.
    pub fn from_degrees(degrees: i32) -> Result<Self, FrameError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(FrameError::UnsupportedRotation(degrees)),
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Whether width and height trade places once upright.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Rotation between the camera sensor and the current device orientation,
/// which is what a capture layer attaches to each frame.
pub fn sensor_to_device_rotation(sensor_degrees: i32, device: FrameRotation) -> Result<FrameRotation, FrameError> {
    FrameRotation::from_degrees((sensor_degrees + device.degrees() + 360) % 360)
}

/// One captured luminance frame. The pixel buffer is owned, so once a frame is
/// handed over nobody else can write into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ns: u64,
    pub rotation: FrameRotation,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, timestamp_ns: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp_ns,
            rotation: FrameRotation::Deg0,
        }
    }

    pub fn with_rotation_degrees(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        degrees: i32,
    ) -> Result<Self, FrameError> {
        Ok(Self {
            rotation: FrameRotation::from_degrees(degrees)?,
            ..Self::new(pixels, width, height, timestamp_ns)
        })
    }

    /// Checks that the buffer really holds `width * height` samples.
    pub fn validate(&self) -> Result<(), FrameError> {
        validate_buffer(self.pixels.len(), self.width, self.height, 1)
    }

    /// Upright size, after rotation.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Converts into an upright grayscale image. A rotated frame also hands
    /// back its original buffer, which is no longer needed.
    pub fn into_upright(self) -> Result<(GrayImage, Option<Vec<u8>>), FrameError> {
        self.validate()?;
        let (width, height, rotation) = (self.width, self.height, self.rotation);
        let image = GrayImage::from_raw(width, height, self.pixels).ok_or(FrameError::SizeMismatch {
            width,
            height,
            expected: width as usize * height as usize,
            actual: 0,
        })?;

        let upright = match rotation {
            FrameRotation::Deg0 => return Ok((image, None)),
            FrameRotation::Deg90 => imageops::rotate90(&image),
            FrameRotation::Deg180 => imageops::rotate180(&image),
            FrameRotation::Deg270 => imageops::rotate270(&image),
        };
        Ok((upright, Some(image.into_raw())))
    }
}

fn validate_buffer(len: usize, width: u32, height: u32, channels: usize) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::EmptyFrame);
    }
    let expected = width as usize * height as usize * channels;
    if len != expected {
        return Err(FrameError::SizeMismatch {
            width,
            height,
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Grayscale copy of an 8-bit RGBA reference buffer.
pub fn gray_from_rgba(pixels: &[u8], width: u32, height: u32) -> Result<GrayImage, FrameError> {
    validate_buffer(pixels.len(), width, height, 4)?;
    let buffer = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(width, height, pixels).ok_or(FrameError::EmptyFrame)?;
    Ok(imageops::grayscale_with_type(&buffer))
}

/// Grayscale copy of an 8-bit RGB reference buffer.
pub fn gray_from_rgb(pixels: &[u8], width: u32, height: u32) -> Result<GrayImage, FrameError> {
    validate_buffer(pixels.len(), width, height, 3)?;
    let buffer = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, pixels).ok_or(FrameError::EmptyFrame)?;
    Ok(imageops::grayscale_with_type(&buffer))
}

/// Grayscale copy of a decoded image of any color type.
pub fn gray_from_dynamic(image: &DynamicImage) -> Result<GrayImage, FrameError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FrameError::EmptyFrame);
    }
    Ok(image.to_luma8())
}
