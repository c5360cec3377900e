use std::{fs, io, path::Path};

use image::DynamicImage;
use resize::px::RGB;
use resize::Pixel::RGB8;
use resize::Type::Lanczos3;
use rgb::{ComponentBytes, FromSlice};

use crate::error::{OptimizeError, Result};

#[derive(Debug)]
pub struct ResizeConfig {
    pub src_height: usize,
    pub src_width: usize,
    pub dest_height: usize,
    pub dest_width: usize,
}

/// Height that keeps the aspect ratio when the width becomes `target_width`,
/// rounded to the nearest pixel and never below one.
pub fn compute_height_preserving_aspect_ratio(
    img_dimensions: (u32, u32),
    target_width: u32,
) -> u32 {
    let (w, h) = (img_dimensions.0 as u64, img_dimensions.1 as u64);
    if w == 0 {
        return h.max(1) as u32;
    }
    let target_width = target_width as u64;
    let height = (2 * target_width * h + w) / (2 * w);
    height.clamp(1, u32::MAX as u64) as u32
}

/// Packed RGB8 pixels of `img`, with any alpha composited onto opaque white.
pub fn flatten_onto_white(img: &DynamicImage) -> Vec<u8> {
    if !img.color().has_alpha() {
        return img.to_rgb8().into_raw();
    }

    let rgba = img.to_rgba8();
    let mut out = Vec::with_capacity(rgba.width() as usize * rgba.height() as usize * 3);
    for px in rgba.pixels() {
        let alpha = px[3] as u32;
        for channel in &px.0[..3] {
            let blended = (*channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            out.push(blended as u8);
        }
    }
    out
}

pub fn resize(img: &[u8], config: ResizeConfig) -> Result<Vec<u8>> {
    let mut dst = vec![RGB::new(0, 0, 0); config.dest_width * config.dest_height];
    let mut resizer = resize::new(
        config.src_width,
        config.src_height,
        config.dest_width,
        config.dest_height,
        RGB8,
        Lanczos3,
    )
    .map_err(|e| OptimizeError::Decode(format!("Error creating resizer: {e}")))?;

    resizer
        .resize(img.as_rgb(), &mut dst)
        .map_err(|e| OptimizeError::Decode(format!("Error resizing image: {e}")))?;

    Ok(dst.as_bytes().to_vec())
}

/// Progressive, Huffman-optimized JPEG of packed RGB8 pixels.
pub fn compress_mozjpeg(img: &[u8], width: usize, height: usize, quality: f32) -> Result<Vec<u8>> {
    std::panic::catch_unwind(|| {
        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);

        comp.set_size(width, height);
        comp.set_quality(quality);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_mem_dest();
        comp.start_compress();

        if !comp.write_scanlines(img) {
            return Err(OptimizeError::Encode("scanline write was incomplete".to_string()));
        }

        comp.finish_compress();
        comp.data_to_vec()
            .map_err(|_| OptimizeError::Encode("JPEG compression failed".to_string()))
    })
    .map_err(|_| OptimizeError::Encode("mozjpeg aborted while compressing".to_string()))?
}

pub fn ensure_parent_directory_exists(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
