//! In-process decoding with the FFmpeg libraries

use super::decode::{estimate_fps, f32le_samples, DecodedFrames};
use crate::error::{ApiNodeError, Result};
use ac_ffmpeg::codec::audio::{AudioDecoder, AudioFrame, AudioResampler, ChannelLayout, SampleFormat};
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame, VideoFrameScaler};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::format::demuxer::Demuxer;
use ac_ffmpeg::format::io::IO;
use ck_nodes_core::{AudioWaveform, ImageBatch};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

const STEREO: u32 = 2;

fn failed(context: &'static str) -> impl Fn(ac_ffmpeg::Error) -> ApiNodeError {
    move |e| ApiNodeError::decode(format!("{}: {}", context, e))
}

/// Decoded frames converted to packed RGB
#[derive(Default)]
struct RgbFrames {
    scaler: Option<VideoFrameScaler>,
    width: usize,
    height: usize,
    raw: Vec<u8>,
    count: usize,
    first_pts: Option<f64>,
    last_pts: Option<f64>,
}

impl RgbFrames {
    fn scaler_for(frame: &VideoFrame) -> Result<VideoFrameScaler> {
        VideoFrameScaler::builder()
            .source_pixel_format(frame.pixel_format())
            .source_width(frame.width())
            .source_height(frame.height())
            .target_pixel_format(get_pixel_format("rgb24"))
            .target_width(frame.width())
            .target_height(frame.height())
            .build()
            .map_err(failed("cannot create rgb24 scaler"))
    }

    fn push(&mut self, frame: &VideoFrame) -> Result<()> {
        let scaler = match self.scaler.take() {
            Some(scaler) => scaler,
            None => {
                self.width = frame.width();
                self.height = frame.height();
                Self::scaler_for(frame)?
            }
        };
        let rgb = self
            .scaler
            .insert(scaler)
            .scale(frame)
            .map_err(failed("cannot convert frame"))?;

        let planes = rgb.planes();
        let plane = planes
            .first()
            .ok_or_else(|| ApiNodeError::decode("converted frame has no planes"))?;
        // rows are padded to `line_size`
        let line = plane.line_size();
        let row_bytes = self.width * 3;
        let data = plane.data();
        for row in 0..self.height {
            let start = row * line;
            let bytes = data
                .get(start..start + row_bytes)
                .ok_or_else(|| ApiNodeError::decode("converted frame is truncated"))?;
            self.raw.extend_from_slice(bytes);
        }

        let pts = frame.pts().as_f64();
        if self.first_pts.is_none() {
            self.first_pts = pts;
        }
        self.last_pts = pts;
        self.count += 1;
        Ok(())
    }

    fn finish(self, path: &Path) -> Result<DecodedFrames> {
        if self.count == 0 {
            tracing::warn!(path = %path.display(), "Video has no frames, using placeholder");
            return Ok(DecodedFrames::placeholder());
        }
        let images = ImageBatch::from_rgb8_raw(&self.raw, self.count, self.height, self.width)?;
        Ok(DecodedFrames {
            images,
            fps: estimate_fps(self.first_pts, self.last_pts, self.count),
        })
    }
}

/// Every frame of the first video stream as RGB in [0, 1]
pub(crate) fn decode_video_frames(path: &Path) -> Result<DecodedFrames> {
    let file = File::open(path)?;
    let mut demuxer = Demuxer::builder()
        .build(IO::from_seekable_read_stream(file))
        .map_err(failed("cannot open container"))?
        .find_stream_info(None)
        .map_err(|(_, e)| failed("cannot read stream info")(e))?;

    let (index, stream) = demuxer
        .streams()
        .iter()
        .enumerate()
        .find(|(_, s)| s.codec_parameters().is_video_codec())
        .ok_or_else(|| ApiNodeError::decode("no video stream"))?;
    let mut decoder = VideoDecoder::from_stream(stream)
        .map_err(failed("cannot create video decoder"))?
        .build()
        .map_err(failed("cannot create video decoder"))?;

    let mut frames = RgbFrames::default();
    while let Some(packet) = demuxer.take().map_err(failed("cannot read packet"))? {
        if packet.stream_index() != index {
            continue;
        }
        decoder.push(packet).map_err(failed("cannot decode packet"))?;
        while let Some(frame) = decoder.take().map_err(failed("cannot decode frame"))? {
            frames.push(&frame)?;
        }
    }
    decoder.flush().map_err(failed("cannot flush video decoder"))?;
    while let Some(frame) = decoder.take().map_err(failed("cannot decode frame"))? {
        frames.push(&frame)?;
    }

    frames.finish(path)
}

fn drain(resampler: &mut AudioResampler, samples: &mut Vec<f32>) -> Result<()> {
    while let Some(frame) = resampler.take().map_err(failed("cannot resample audio"))? {
        append_samples(&frame, samples);
    }
    Ok(())
}

fn append_samples(frame: &AudioFrame, samples: &mut Vec<f32>) {
    // packed float: one plane, channels interleaved
    if let Some(plane) = frame.planes().first() {
        let count = frame.samples() * STEREO as usize;
        samples.extend(f32le_samples(plane.data()).into_iter().take(count));
    }
}

/// First audio stream as interleaved f32 stereo at its own sample rate
pub(crate) fn decode_audio_track(path: &Path) -> Result<AudioWaveform> {
    let file = File::open(path)?;
    let mut demuxer = Demuxer::builder()
        .build(IO::from_seekable_read_stream(file))
        .map_err(failed("cannot open container"))?
        .find_stream_info(None)
        .map_err(|(_, e)| failed("cannot read stream info")(e))?;

    let (index, stream) = demuxer
        .streams()
        .iter()
        .enumerate()
        .find(|(_, s)| s.codec_parameters().is_audio_codec())
        .ok_or_else(|| ApiNodeError::decode("no audio stream"))?;
    let mut decoder = AudioDecoder::from_stream(stream)
        .map_err(failed("cannot create audio decoder"))?
        .build()
        .map_err(failed("cannot create audio decoder"))?;

    let params = decoder.codec_parameters();
    let sample_rate = params.sample_rate();
    let target_format = SampleFormat::from_str("flt")
        .map_err(|_| ApiNodeError::decode("sample format 'flt' unavailable"))?;
    let target_layout = ChannelLayout::from_channels(STEREO)
        .ok_or_else(|| ApiNodeError::decode("stereo channel layout unavailable"))?;
    let mut resampler = AudioResampler::builder()
        .source_channel_layout(params.channel_layout().to_owned())
        .source_sample_format(params.sample_format())
        .source_sample_rate(sample_rate)
        .target_channel_layout(target_layout)
        .target_sample_format(target_format)
        .target_sample_rate(sample_rate)
        .build()
        .map_err(failed("cannot create audio resampler"))?;

    let mut samples = Vec::new();
    while let Some(packet) = demuxer.take().map_err(failed("cannot read packet"))? {
        if packet.stream_index() != index {
            continue;
        }
        decoder.push(packet).map_err(failed("cannot decode packet"))?;
        while let Some(frame) = decoder.take().map_err(failed("cannot decode audio"))? {
            resampler.push(frame).map_err(failed("cannot resample audio"))?;
            drain(&mut resampler, &mut samples)?;
        }
    }
    decoder.flush().map_err(failed("cannot flush audio decoder"))?;
    while let Some(frame) = decoder.take().map_err(failed("cannot decode audio"))? {
        resampler.push(frame).map_err(failed("cannot resample audio"))?;
        drain(&mut resampler, &mut samples)?;
    }
    resampler.flush().map_err(failed("cannot flush audio resampler"))?;
    drain(&mut resampler, &mut samples)?;

    if samples.is_empty() {
        return Err(ApiNodeError::decode("no audio samples"));
    }
    tracing::debug!(
        path = %path.display(),
        samples = samples.len() / STEREO as usize,
        sample_rate,
        "Decoded audio track"
    );
    Ok(AudioWaveform::from_interleaved(&samples, STEREO as usize, sample_rate))
}
