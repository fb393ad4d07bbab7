use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::{FaceVerifyError, Result};

/// Decode `src`, shrink it to at most `max_width` pixels wide (aspect kept,
/// never upscaled) and write it to `dest` as JPEG. Blocking; call from
/// `spawn_blocking`. Returns the size of `dest`.
pub(crate) fn compress_to_jpeg(src: &Path, dest: &Path, max_width: u32, quality: u8) -> Result<u64> {
    let processing = |e: image::ImageError| FaceVerifyError::ImageProcessing(e.to_string());

    let img = image::io::Reader::open(src)?
        .with_guessed_format()?
        .decode()
        .map_err(processing)?;

    let (width, height) = (img.width(), img.height());
    let img = if width > max_width {
        let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
        img.resize_exact(max_width, new_height, FilterType::Triangle)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let file = std::fs::File::create(dest)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(processing)?;
    writer.flush()?;
    drop(writer);

    Ok(std::fs::metadata(dest)?.len())
}
