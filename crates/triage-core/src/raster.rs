#![forbid(unsafe_code)]

//! Small rasters for the genie animation, and the policy that prepares them.
//!
//! A [`Raster`] owns its pixel memory exclusively. Whoever holds it decides
//! when it dies; dropping it reports the release to an optional
//! [`RasterRecycler`] exactly once. This replaces manual "recycle" calls:
//! the animation controller, the preload scheduler, and a stale result that
//! gets discarded all release by dropping.
//!
//! [`prepare_raster`] implements the preparation policy:
//!
//! 1. memory cache hit: downscale a copy to the target bound;
//! 2. otherwise decode with a power-of-two sample factor (decoded size close
//!    to, but not below, the target; doubled for very large sources) and the
//!    reduced [`ColorDepth::Rgb565`] depth.
//!
//! Both steps are best-effort: any failure yields `None`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorDepth {
    /// 32-bit, 4 bytes per pixel.
    Argb8888,
    /// 16-bit, 2 bytes per pixel. Half the memory, faster to decode.
    Rgb565,
}

impl ColorDepth {
    #[inline]
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Argb8888 => 4,
            Self::Rgb565 => 2,
        }
    }
}

/// Reference to an image in the user's library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Library identifier (stable across sessions).
    pub id: u64,
    /// Location understood by the decoder.
    pub uri: String,
}

impl ImageRef {
    #[must_use]
    pub fn new(id: u64, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
        }
    }

    /// Stable per-image key used by the memory cache.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("img:{}", self.id)
    }
}

/// Dimensions and depth of a raster, reported to the recycler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterInfo {
    pub width: u32,
    pub height: u32,
    pub depth: ColorDepth,
}

impl RasterInfo {
    /// Bytes of pixel memory.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.depth.bytes_per_pixel()
    }
}

/// Notified when a [`Raster`] carrying it is dropped.
pub trait RasterRecycler: Send + Sync {
    fn recycle(&self, info: RasterInfo);
}

/// A single-owner pixel buffer.
pub struct Raster {
    info: RasterInfo,
    pixels: Vec<u8>,
    recycler: Option<Arc<dyn RasterRecycler>>,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.info.width)
            .field("height", &self.info.height)
            .field("depth", &self.info.depth)
            .field("tracked", &self.recycler.is_some())
            .finish()
    }
}

impl Raster {
    /// Wrap pixel data. Returns `None` when the buffer length does not match
    /// `width × height × bytes_per_pixel` or a dimension is zero.
    #[must_use]
    pub fn from_pixels(width: u32, height: u32, depth: ColorDepth, pixels: Vec<u8>) -> Option<Self> {
        let info = RasterInfo {
            width,
            height,
            depth,
        };
        if width == 0 || height == 0 || pixels.len() != info.byte_len() {
            return None;
        }
        Some(Self {
            info,
            pixels,
            recycler: None,
        })
    }

    /// A raster filled with one pixel value (little-endian).
    #[must_use]
    pub fn solid(width: u32, height: u32, depth: ColorDepth, value: u32) -> Option<Self> {
        let bpp = depth.bytes_per_pixel();
        let px = value.to_le_bytes();
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * bpp);
        for _ in 0..count {
            pixels.extend_from_slice(&px[..bpp]);
        }
        Self::from_pixels(width, height, depth, pixels)
    }

    /// Attach a recycler notified on drop.
    #[must_use]
    pub fn with_recycler(mut self, recycler: Arc<dyn RasterRecycler>) -> Self {
        self.recycler = Some(recycler);
        self
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.info.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.info.height
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> ColorDepth {
        self.info.depth
    }

    #[inline]
    #[must_use]
    pub fn info(&self) -> RasterInfo {
        self.info
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Nearest-neighbour copy whose longer side is at most `max_dim`.
    ///
    /// The copy keeps the aspect ratio and depth, carries the same recycler,
    /// and is never upscaled.
    #[must_use]
    pub fn downscaled(&self, max_dim: u32) -> Raster {
        let (w, h) = fit_within(self.info.width, self.info.height, max_dim);
        let bpp = self.info.depth.bytes_per_pixel();
        let src_w = self.info.width as usize;
        let mut pixels = Vec::with_capacity(w as usize * h as usize * bpp);
        for y in 0..h as usize {
            let sy = y * self.info.height as usize / h as usize;
            for x in 0..w as usize {
                let sx = x * src_w / w as usize;
                let at = (sy * src_w + sx) * bpp;
                pixels.extend_from_slice(&self.pixels[at..at + bpp]);
            }
        }
        Raster {
            info: RasterInfo {
                width: w,
                height: h,
                depth: self.info.depth,
            },
            pixels,
            recycler: self.recycler.clone(),
        }
    }

    /// Like [`Raster::downscaled`], but consumes `self` and moves its
    /// recycler to the result, so the release is reported once in total.
    #[must_use]
    pub fn into_downscaled(mut self, max_dim: u32) -> Raster {
        if self.info.width.max(self.info.height) <= max_dim {
            return self;
        }
        let recycler = self.recycler.take();
        let mut small = self.downscaled(max_dim);
        small.recycler = recycler;
        small
    }
}

impl Drop for Raster {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            trace!(
                width = self.info.width,
                height = self.info.height,
                "raster released"
            );
            recycler.recycle(self.info);
        }
    }
}

/// Largest size with the same aspect ratio whose longer side is at most
/// `max_dim`. Never upscales; never returns a zero dimension.
#[must_use]
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let max_dim = max_dim.max(1);
    let longest = width.max(height);
    if longest <= max_dim {
        return (width.max(1), height.max(1));
    }
    let scale = max_dim as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_dim);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_dim);
    (w, h)
}

/// Power-of-two sample factor so that decoding at `1/factor` keeps both
/// dimensions at or above the target, doubled once more when the source has
/// more than `large_source_pixels` pixels.
#[must_use]
pub fn sample_factor(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
    large_source_pixels: u64,
) -> u32 {
    let target_width = target_width.max(1);
    let target_height = target_height.max(1);
    let mut factor = 1u32;
    if src_height > target_height || src_width > target_width {
        let half_h = src_height / 2;
        let half_w = src_width / 2;
        while half_h / factor >= target_height && half_w / factor >= target_width {
            factor *= 2;
        }
    }
    let pixels = src_width as u64 * src_height as u64;
    if pixels > large_source_pixels {
        factor = factor.saturating_mul(2);
    }
    factor
}

/// Decode parameters chosen by [`prepare_raster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub sample_factor: u32,
    pub depth: ColorDepth,
    /// Bound the decoder should respect after subsampling.
    pub max_width: u32,
    pub max_height: u32,
}

/// Image decoding and memory-cache capability.
///
/// Every method is best-effort: failure is `None`, never a panic.
pub trait RasterSource: Send + Sync {
    /// Fast in-memory lookup by stable key. Must not touch persistent storage.
    /// The returned copy's longer side should be at most `max_dim`.
    fn lookup(&self, key: &str, max_dim: u32) -> Option<Raster>;

    /// Source dimensions without decoding pixels.
    fn probe(&self, image: &ImageRef) -> Option<(u32, u32)>;

    /// Decode from the source.
    fn decode(&self, image: &ImageRef, options: DecodeOptions) -> Option<Raster>;
}

/// Knobs for [`prepare_raster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Longest side of the prepared raster.
    pub max_dim: u32,
    /// Pixel count above which the sample factor is doubled.
    pub large_source_pixels: u64,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            max_dim: 250,
            large_source_pixels: 12_000_000,
        }
    }
}

/// Produce a small raster for `image`, preferring the memory cache.
pub fn prepare_raster(
    source: &dyn RasterSource,
    image: &ImageRef,
    options: PrepareOptions,
) -> Option<Raster> {
    let key = image.cache_key();
    if let Some(cached) = source.lookup(&key, options.max_dim) {
        trace!(%key, "raster from memory cache");
        return Some(cached.into_downscaled(options.max_dim));
    }

    let Some((src_w, src_h)) = source.probe(image) else {
        debug!(uri = %image.uri, "raster probe failed");
        return None;
    };
    let (target_w, target_h) = fit_within(src_w, src_h, options.max_dim);
    let decode = DecodeOptions {
        sample_factor: sample_factor(src_w, src_h, target_w, target_h, options.large_source_pixels),
        depth: ColorDepth::Rgb565,
        max_width: target_w,
        max_height: target_h,
    };
    let Some(decoded) = source.decode(image, decode) else {
        debug!(uri = %image.uri, "raster decode failed");
        return None;
    };
    Some(decoded.into_downscaled(options.max_dim))
}
