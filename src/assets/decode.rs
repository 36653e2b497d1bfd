use std::sync::Arc;

use anyhow::Context;

use crate::foundation::error::{GenError, GenResult};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Decoded trait image in premultiplied RGBA8 form, shared cheaply between items.
pub struct TraitPayload {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl TraitPayload {
    /// Wrap already premultiplied pixels. Fails if the buffer does not match `width * height * 4`.
    pub fn from_rgba8_premul(width: u32, height: u32, pixels: Vec<u8>) -> GenResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| GenError::validation("payload dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(GenError::validation(format!(
                "payload of {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(pixels),
        })
    }

    /// Bytes charged against the cache budget.
    pub fn size_bytes(&self) -> usize {
        self.rgba8_premul.len()
    }

    /// `true` when both payloads share one pixel buffer.
    pub fn shares_pixels(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.rgba8_premul, &other.rgba8_premul)
    }
}

/// Decode encoded image bytes (PNG or any format `image` knows) into premultiplied RGBA8.
pub fn decode_trait_image(bytes: &[u8]) -> GenResult<TraitPayload> {
    let dyn_img = image::load_from_memory(bytes).context("decode trait image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(TraitPayload {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
