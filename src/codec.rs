use std::{fs, path::Path};

use image::{ColorType, GenericImageView};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{OptimizeError, Result};
use crate::search::Measured;
use crate::utils::{self, ResizeConfig};

/// Lowest and highest quality the encoder accepts.
pub const QUALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

/// What the source looked like before any work was done.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAsset {
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    #[serde(serialize_with = "serialize_color")]
    pub color: ColorType,
}

fn serialize_color<S: serde::Serializer>(
    color: &ColorType,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{color:?}"))
}

/// Opaque RGB8 pixels at their final resolution, ready for trial encodes.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    source: ImageAsset,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Measured for EncodedImage {
    fn measured_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl PreparedImage {
    pub fn open(path: &Path, max_width: Option<u32>) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(&data, max_width)
    }

    /// Decodes `data`, flattens it onto white and shrinks it to `max_width`
    /// when wider. Narrower images keep their native resolution.
    pub fn from_bytes(data: &[u8], max_width: Option<u32>) -> Result<Self> {
        if max_width == Some(0) {
            return Err(OptimizeError::InvalidBatch(
                "max width must be a positive number of pixels".to_string(),
            ));
        }

        let img = decode(data)?;
        let (src_w, src_h) = img.dimensions();
        let source = ImageAsset {
            byte_size: data.len() as u64,
            width: src_w,
            height: src_h,
            color: img.color(),
        };

        let flat = utils::flatten_onto_white(&img);
        drop(img);

        let (pixels, width, height) = match max_width {
            Some(max_w) if src_w > max_w => {
                let dest_h = utils::compute_height_preserving_aspect_ratio((src_w, src_h), max_w);
                let resized = utils::resize(
                    &flat,
                    ResizeConfig {
                        src_height: src_h as usize,
                        src_width: src_w as usize,
                        dest_height: dest_h as usize,
                        dest_width: max_w as usize,
                    },
                )?;
                debug!(from = %format!("{src_w}x{src_h}"), to = %format!("{max_w}x{dest_h}"), "resized");
                (resized, max_w, dest_h)
            }
            _ => (flat, src_w, src_h),
        };

        Ok(PreparedImage {
            source,
            pixels,
            width,
            height,
        })
    }

    pub fn source(&self) -> &ImageAsset {
        &self.source
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn was_resized(&self) -> bool {
        self.width != self.source.width || self.height != self.source.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Progressive JPEG at `quality`. The result lives only in memory.
    pub fn encode_at(&self, quality: u8) -> Result<EncodedImage> {
        if !QUALITY_RANGE.contains(&quality) {
            return Err(OptimizeError::Encode(format!(
                "quality {quality} is outside {}..={}",
                QUALITY_RANGE.start(),
                QUALITY_RANGE.end()
            )));
        }
        let bytes = utils::compress_mozjpeg(
            &self.pixels,
            self.width as usize,
            self.height as usize,
            quality as f32,
        )?;
        Ok(EncodedImage {
            bytes,
            width: self.width,
            height: self.height,
        })
    }
}

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

// A JPEG cut off mid-scan fails with an I/O error inside the entropy decoder.
// Closing it with an EOI marker lets the decoder fill the rest with zeros.
fn decode(data: &[u8]) -> Result<image::DynamicImage> {
    match image::load_from_memory(data) {
        Ok(img) => Ok(img),
        Err(e) if data.starts_with(&SOI) && !data.ends_with(&EOI) => {
            let mut closed = Vec::with_capacity(data.len() + EOI.len());
            closed.extend_from_slice(data);
            closed.extend_from_slice(&EOI);
            let img = image::load_from_memory(&closed).map_err(|_| OptimizeError::Decode(e.to_string()))?;
            warn!(bytes = data.len(), "JPEG is truncated, decoded what was there");
            Ok(img)
        }
        Err(e) => Err(OptimizeError::Decode(e.to_string())),
    }
}

/// One-shot form of [`PreparedImage::from_bytes`] followed by [`PreparedImage::encode_at`].
pub fn encode_at(data: &[u8], quality: u8, max_width: Option<u32>) -> Result<EncodedImage> {
    PreparedImage::from_bytes(data, max_width)?.encode_at(quality)
}
