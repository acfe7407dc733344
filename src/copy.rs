//! Copying of non-transformed assets into the output tree.
//!
//! Images and fonts keep their path relative to the source directory,
//! extras keep theirs relative to the public directory. PNG files are
//! recompressed losslessly on the way and the smaller encoding wins;
//! everything else is copied byte for byte.

use std::time::Instant;

use camino::Utf8Path;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use thiserror::Error;
use tracing::{debug, info};

use crate::Website;
use crate::asset::{Category, enumerate};
use crate::error::BuildError;
use crate::io::as_overhead;

/// Errors that can occur when recompressing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// An error occurred during image decoding or encoding.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The image carries data that a plain re-encode would drop.
    #[error("Image has a '{0}' chunk that can't be carried over")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files: usize,
    /// Bytes saved by recompression.
    pub saved: u64,
}

/// Copies every file of a non-transformed category into the output tree.
pub fn copy_category(site: &Website, category: Category) -> Result<CopyReport, BuildError> {
    let s = Instant::now();
    let output = site.output();
    let sources = enumerate(&site.root, &site.config.paths, category)?;

    let saved = sources
        .into_par_iter()
        .map(|source| {
            let dest = output.join(&source.relative);

            match category {
                Category::Image | Category::Font => {
                    let data = crate::io::read(&source.path)?;
                    match optimize_lossless(&source.relative, &data) {
                        Some(smaller) => {
                            crate::io::write(&dest, &smaller)?;
                            Ok((data.len() - smaller.len()) as u64)
                        }
                        None => {
                            crate::io::write(&dest, &data)?;
                            Ok(0)
                        }
                    }
                }
                _ => {
                    crate::io::copy(&source.path, &dest)?;
                    Ok(0)
                }
            }
        })
        .collect::<Result<Vec<u64>, BuildError>>()?;

    let report = CopyReport {
        files: saved.len(),
        saved: saved.iter().sum(),
    };

    info!(
        "copied {} {} file(s), saved {} bytes {}",
        report.files,
        category,
        report.saved,
        as_overhead(s)
    );

    Ok(report)
}

/// Returns a smaller encoding with identical pixels, or `None` when the file
/// should be copied unchanged: unknown or already optimal formats, images
/// that fail to decode and recompressions that don't pay off.
pub fn optimize_lossless(path: &Utf8Path, data: &[u8]) -> Option<Vec<u8>> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));

    if !is_png {
        return None;
    }

    match recompress_png(data) {
        Ok(out) if out.len() < data.len() => Some(out),
        Ok(_) => None,
        Err(e) => {
            debug!("keeping '{path}' as is: {e}");
            None
        }
    }
}

/// Ancillary chunks that change how pixels are displayed. The decoder
/// doesn't hand them back, so files carrying them are left alone.
const KEEP: [&[u8; 4]; 5] = [b"iCCP", b"gAMA", b"cHRM", b"sRGB", b"acTL"];

fn recompress_png(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    if let Some(chunk) = png_chunks(data).find(|kind| KEEP.contains(&kind)) {
        return Err(ImageError::Unsupported(String::from_utf8_lossy(&chunk).into_owned()));
    }

    let img = image::load_from_memory_with_format(data, ImageFormat::Png)?;

    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive).write_image(
        img.as_bytes(),
        img.width(),
        img.height(),
        img.color().into(),
    )?;

    Ok(out)
}

/// Chunk types of a PNG stream, in file order.
fn png_chunks(data: &[u8]) -> impl Iterator<Item = [u8; 4]> + '_ {
    let mut pos = 8;

    std::iter::from_fn(move || {
        let header = data.get(pos..pos + 8)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];

        pos = pos.checked_add(12)?.checked_add(len)?;
        Some(kind)
    })
}
