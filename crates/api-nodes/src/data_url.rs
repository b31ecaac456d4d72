//! Image frames as base64 `data:` URLs for JSON request bodies

use base64::Engine;
use ck_nodes_core::ImageBatch;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::io::Cursor;

pub const JPEG_QUALITY: u8 = 90;

fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Frame `index` as a PNG data URL, keeping its channel layout
pub fn png_data_url(images: &ImageBatch, index: usize) -> ck_nodes_core::Result<String> {
    let frame = images.to_dynamic(index)?;
    let mut bytes = Cursor::new(Vec::new());
    frame.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", encode_base64(bytes.get_ref())))
}

/// Frame `index` as an RGB JPEG data URL
pub fn jpeg_data_url(images: &ImageBatch, index: usize, quality: u8) -> ck_nodes_core::Result<String> {
    let frame = images.to_rgb8(index)?;
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&frame)?;
    Ok(format!("data:image/jpeg;base64,{}", encode_base64(&bytes)))
}

/// PNG data URLs for every frame of every batch, in order
pub fn png_data_urls<'a, I>(batches: I) -> ck_nodes_core::Result<Vec<String>>
where
    I: IntoIterator<Item = &'a ImageBatch>,
{
    let mut urls = Vec::new();
    for batch in batches {
        for index in 0..batch.len() {
            urls.push(png_data_url(batch, index)?);
        }
    }
    Ok(urls)
}
