//! Image / video frame batches

use crate::{Error, Result};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{s, Array4, ArrayView3, Axis};
use std::ops::Range;

/// Batch of images shaped `(B, H, W, C)` with values in `[0, 1]`
///
/// The first axis doubles as the time axis when the batch holds video frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    data: Array4<f32>,
}

impl ImageBatch {
    /// Wrap an array, rejecting channel counts other than 1, 3 or 4
    pub fn new(data: Array4<f32>) -> Result<Self> {
        let channels = data.dim().3;
        if !matches!(channels, 1 | 3 | 4) {
            return Err(Error::invalid_input(
                "images",
                format!("unsupported channel count {}", channels),
            ));
        }
        Ok(Self { data })
    }

    /// Black batch, used as the placeholder output of failed API calls
    pub fn zeros(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            data: Array4::zeros((batch, height, width, channels)),
        }
    }

    /// Build a batch from interleaved RGB bytes of `frames` frames
    pub fn from_rgb8_raw(bytes: &[u8], frames: usize, height: usize, width: usize) -> Result<Self> {
        let expected = frames * height * width * 3;
        if bytes.len() < expected {
            return Err(Error::invalid_input(
                "frames",
                format!("expected {} bytes of RGB data, got {}", expected, bytes.len()),
            ));
        }
        let data = Array4::from_shape_vec(
            (frames, height, width, 3),
            bytes[..expected].iter().map(|&b| b as f32 / 255.0).collect(),
        )?;
        Ok(Self { data })
    }

    /// Build a batch from equally sized RGB frames
    pub fn from_rgb8_frames(frames: &[RgbImage]) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Ok(Self::zeros(0, 0, 0, 3));
        };
        let (width, height) = first.dimensions();
        let mut bytes = Vec::with_capacity(frames.len() * (width * height * 3) as usize);
        for (index, frame) in frames.iter().enumerate() {
            if frame.dimensions() != (width, height) {
                return Err(Error::invalid_input(
                    "frames",
                    format!(
                        "frame {} is {:?}, expected {:?}",
                        index,
                        frame.dimensions(),
                        (width, height)
                    ),
                ));
            }
            bytes.extend_from_slice(frame.as_raw());
        }
        Self::from_rgb8_raw(&bytes, frames.len(), height as usize, width as usize)
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }

    /// Number of images (frames)
    pub fn len(&self) -> usize {
        self.data.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn channels(&self) -> usize {
        self.data.dim().3
    }

    /// Contiguous sub-batch along the batch axis
    pub fn frames(&self, range: Range<usize>) -> ImageBatch {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            data: self.data.slice(s![start..end, .., .., ..]).to_owned(),
        }
    }

    /// Batch made of the frames at `indices`, in order
    pub fn select(&self, indices: &[usize]) -> ImageBatch {
        Self {
            data: self.data.select(Axis(0), indices),
        }
    }

    pub fn frame(&self, index: usize) -> Option<ArrayView3<'_, f32>> {
        (index < self.len()).then(|| self.data.index_axis(Axis(0), index))
    }

    /// First three channels (drops alpha)
    pub fn rgb(&self) -> ImageBatch {
        if self.channels() <= 3 {
            return self.clone();
        }
        Self {
            data: self.data.slice(s![.., .., .., 0..3]).to_owned(),
        }
    }

    /// Frame `index` as 8-bit RGB (greyscale is replicated, alpha dropped)
    pub fn to_rgb8(&self, index: usize) -> Result<RgbImage> {
        let frame = self.frame_or_err(index)?;
        let (height, width, channels) = frame.dim();
        let mut img = RgbImage::new(width as u32, height as u32);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                pixel.0[c] = to_u8(frame[[y, x, c.min(channels - 1)]]);
            }
        }
        Ok(img)
    }

    /// Frame `index` in its native channel layout
    pub fn to_dynamic(&self, index: usize) -> Result<DynamicImage> {
        let frame = self.frame_or_err(index)?;
        let (height, width, channels) = frame.dim();
        let raw: Vec<u8> = frame.iter().map(|&v| to_u8(v)).collect();
        let (w, h) = (width as u32, height as u32);
        let image = match channels {
            1 => GrayImage::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
            _ => None,
        };
        image.ok_or_else(|| Error::Image(format!("cannot convert {}-channel frame", channels)))
    }

    /// Bilinear resize after cropping the centre to the target aspect ratio
    ///
    /// Sampling matches half-pixel-centre bilinear interpolation
    /// (`align_corners = false`).
    pub fn resize_bilinear_center(&self, width: usize, height: usize) -> ImageBatch {
        let (batch, old_h, old_w, channels) = self.data.dim();
        if old_h == height && old_w == width {
            return self.clone();
        }
        if batch == 0 || old_h == 0 || old_w == 0 || width == 0 || height == 0 {
            return Self::zeros(batch, height, width, channels);
        }

        let (x, y) = center_crop_offsets(old_w, old_h, width, height);
        let cropped = self.data.slice(s![.., y..old_h - y, x..old_w - x, ..]);
        let (_, in_h, in_w, _) = cropped.dim();
        let rows = axis_weights(in_h, height);
        let cols = axis_weights(in_w, width);

        let mut out = Array4::<f32>::zeros((batch, height, width, channels));
        for n in 0..batch {
            for (oy, &(y0, y1, ly)) in rows.iter().enumerate() {
                for (ox, &(x0, x1, lx)) in cols.iter().enumerate() {
                    for c in 0..channels {
                        let top = cropped[[n, y0, x0, c]] * (1.0 - lx) + cropped[[n, y0, x1, c]] * lx;
                        let bottom =
                            cropped[[n, y1, x0, c]] * (1.0 - lx) + cropped[[n, y1, x1, c]] * lx;
                        out[[n, oy, ox, c]] = top * (1.0 - ly) + bottom * ly;
                    }
                }
            }
        }
        Self { data: out }
    }

    fn frame_or_err(&self, index: usize) -> Result<ArrayView3<'_, f32>> {
        self.frame(index).ok_or_else(|| {
            Error::invalid_input(
                "images",
                format!("frame {} out of range for batch of {}", index, self.len()),
            )
        })
    }
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0).clamp(0.0, 255.0) as u8
}

/// Pixels trimmed from each side so the remaining region has the target aspect
fn center_crop_offsets(old_w: usize, old_h: usize, width: usize, height: usize) -> (usize, usize) {
    let old_aspect = old_w as f64 / old_h as f64;
    let new_aspect = width as f64 / height as f64;
    let mut x = 0usize;
    let mut y = 0usize;
    if old_aspect > new_aspect {
        x = ((old_w as f64 - old_w as f64 * (new_aspect / old_aspect)) / 2.0).round() as usize;
    } else if old_aspect < new_aspect {
        y = ((old_h as f64 - old_h as f64 * (old_aspect / new_aspect)) / 2.0).round() as usize;
    }
    // keep at least one source row/column
    x = x.min(old_w.saturating_sub(1) / 2);
    y = y.min(old_h.saturating_sub(1) / 2);
    (x, y)
}

/// (lower index, upper index, upper weight) per output position
fn axis_weights(input: usize, output: usize) -> Vec<(usize, usize, f32)> {
    let scale = input as f32 / output as f32;
    (0..output)
        .map(|o| {
            let src = ((o as f32 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (src.floor() as usize).min(input - 1);
            let i1 = if i0 + 1 < input { i0 + 1 } else { i0 };
            (i0, i1, src - i0 as f32)
        })
        .collect()
}
