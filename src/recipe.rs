//! Per-track bypass/transcode decisions.

use ffmpeg_next::{
    Rational,
    format::{Pixel, Sample},
};
use media_bus::encoder::EncoderParams;

use crate::error::{Error, Result};
use crate::types::{Codec, InputDescriptor, MediaType, StreamInfo};

pub const OPUS_SAMPLE_RATE: u32 = 48000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Bypass,
    Transcode,
}

/// One adjustment of the output encoder context, applied after the values
/// copied from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderOption {
    SampleRate(u32),
    TimeBase(Rational),
    SampleFormat(Sample),
    PixelFormat(Pixel),
    BitRate(usize),
    GopSize(u32),
}

impl EncoderOption {
    pub fn apply(&self, encoder: &mut dyn EncoderParams) {
        match *self {
            EncoderOption::SampleRate(rate) => encoder.set_sample_rate(rate),
            EncoderOption::TimeBase(time_base) => encoder.set_time_base(time_base),
            EncoderOption::SampleFormat(format) => encoder.set_sample_format(format),
            EncoderOption::PixelFormat(format) => encoder.set_pixel_format(format),
            EncoderOption::BitRate(bit_rate) => encoder.set_bit_rate(bit_rate),
            EncoderOption::GopSize(gop) => encoder.set_gop(gop),
        }
    }
}

/// Applies `options` in order, so later entries override earlier ones.
pub fn apply_options(options: &[EncoderOption], encoder: &mut dyn EncoderParams) {
    for option in options {
        option.apply(encoder);
    }
}

/// What to do with one track. Bypass tasks never carry encoder options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTask {
    action: MediaAction,
    codec: Codec,
    encoder_options: Vec<EncoderOption>,
}

impl MediaTask {
    pub fn bypass(codec: Codec) -> Self {
        Self {
            action: MediaAction::Bypass,
            codec,
            encoder_options: Vec::new(),
        }
    }

    pub fn transcode(codec: Codec, encoder_options: Vec<EncoderOption>) -> Self {
        Self {
            action: MediaAction::Transcode,
            codec,
            encoder_options,
        }
    }

    pub fn action(&self) -> MediaAction {
        self.action
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn encoder_options(&self) -> &[EncoderOption] {
        &self.encoder_options
    }

    pub fn is_bypass(&self) -> bool {
        self.action == MediaAction::Bypass
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub input: InputDescriptor,
    pub video: MediaTask,
    pub audio: MediaTask,
}

impl Recipe {
    pub fn task_for(&self, media_type: MediaType) -> Option<&MediaTask> {
        match media_type {
            MediaType::Video => Some(&self.video),
            MediaType::Audio => Some(&self.audio),
            MediaType::Unknown => None,
        }
    }
}

pub trait RecipePlanner: Send + Sync {
    fn recipe_for(
        &self,
        input: InputDescriptor,
        server: &StreamInfo,
        client: &StreamInfo,
    ) -> Result<Recipe>;
}

/// Bypasses video at the ingest codec and transcodes audio to 48 kHz Opus,
/// whatever the client advertises.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRecipePlanner;

impl RecipePlanner for FixedRecipePlanner {
    fn recipe_for(
        &self,
        input: InputDescriptor,
        server: &StreamInfo,
        _client: &StreamInfo,
    ) -> Result<Recipe> {
        let video_codec = server
            .video_streams()
            .map(|s| s.codec)
            .find(|codec| *codec != Codec::Unknown)
            .unwrap_or(Codec::H264);
        if video_codec != Codec::H264 {
            log::warn!("bypassing {} video, the sink may not accept it", video_codec);
        }

        Ok(Recipe {
            input,
            video: MediaTask::bypass(video_codec),
            audio: MediaTask::transcode(
                Codec::Opus,
                vec![
                    EncoderOption::SampleRate(OPUS_SAMPLE_RATE),
                    EncoderOption::TimeBase(Rational::new(1, OPUS_SAMPLE_RATE as i32)),
                ],
            ),
        })
    }
}

/// Target codec of a transcode task, as an FFmpeg codec id.
pub fn encoder_codec_id(task: &MediaTask) -> Result<ffmpeg_next::codec::Id> {
    task.codec()
        .codec_id()
        .ok_or(Error::UnsupportedCodec(task.codec()))
}
