use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use ffmpeg_next::codec::Id;
use media_bus::captions::Cue;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Aac,
    Opus,
    Unknown,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
            Codec::Av1 => "av1",
            Codec::Aac => "aac",
            Codec::Opus => "opus",
            Codec::Unknown => "unknown",
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Codec::H264 | Codec::H265 | Codec::Vp8 | Codec::Vp9 | Codec::Av1 => MediaType::Video,
            Codec::Aac | Codec::Opus => MediaType::Audio,
            Codec::Unknown => MediaType::Unknown,
        }
    }

    pub fn from_codec_id(id: Id) -> Self {
        match id {
            Id::H264 => Codec::H264,
            Id::HEVC => Codec::H265,
            Id::VP8 => Codec::Vp8,
            Id::VP9 => Codec::Vp9,
            Id::AV1 => Codec::Av1,
            Id::AAC => Codec::Aac,
            Id::OPUS => Codec::Opus,
            _ => Codec::Unknown,
        }
    }

    pub fn codec_id(&self) -> Option<Id> {
        match self {
            Codec::H264 => Some(Id::H264),
            Codec::H265 => Some(Id::HEVC),
            Codec::Vp8 => Some(Id::VP8),
            Codec::Vp9 => Some(Id::VP9),
            Codec::Av1 => Some(Id::AV1),
            Codec::Aac => Some(Id::AAC),
            Codec::Opus => Some(Id::OPUS),
            Codec::Unknown => None,
        }
    }

    /// Maps an MPEG-TS PMT `stream_type` to a codec and media type.
    pub fn from_ts_stream_type(stream_type: u8) -> (Codec, MediaType) {
        match stream_type {
            0x1b => (Codec::H264, MediaType::Video),
            0x24 => (Codec::H265, MediaType::Video),
            0x0f | 0x11 => (Codec::Aac, MediaType::Audio),
            0x01 | 0x02 | 0x10 => (Codec::Unknown, MediaType::Video),
            0x03 | 0x04 | 0x81 => (Codec::Unknown, MediaType::Audio),
            _ => (Codec::Unknown, MediaType::Unknown),
        }
    }

    /// Maps an SDP `rtpmap` encoding name.
    pub fn from_rtp_encoding(name: &str) -> Codec {
        match name.to_ascii_lowercase().as_str() {
            "h264" => Codec::H264,
            "h265" => Codec::H265,
            "vp8" => Codec::Vp8,
            "vp9" => Codec::Vp9,
            "av1" | "av1x" => Codec::Av1,
            "opus" => Codec::Opus,
            "mpeg4-generic" | "mp4a-latm" => Codec::Aac,
            _ => Codec::Unknown,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Unknown,
}

impl From<ffmpeg_next::media::Type> for MediaType {
    fn from(medium: ffmpeg_next::media::Type) -> Self {
        match medium {
            ffmpeg_next::media::Type::Video => MediaType::Video,
            ffmpeg_next::media::Type::Audio => MediaType::Audio,
            _ => MediaType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub codec: Codec,
    pub media_type: MediaType,
    /// Transport-level track identifier (PID for MPEG-TS).
    pub id: u16,
    pub index: u16,
}

impl From<&media_bus::stream::AvStream> for Stream {
    fn from(stream: &media_bus::stream::AvStream) -> Self {
        Self {
            codec: Codec::from_codec_id(stream.codec_id()),
            media_type: MediaType::from(stream.medium()),
            id: u16::try_from(stream.id()).unwrap_or_default(),
            index: u16::try_from(stream.index()).unwrap_or_default(),
        }
    }
}

/// Streams discovered on one side of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    streams: Vec<Stream>,
}

impl StreamInfo {
    pub fn new(streams: Vec<Stream>) -> Self {
        Self { streams }
    }

    /// Keeps one stream per codec. A later stream replaces an earlier one
    /// with the same codec but keeps its position.
    pub fn dedup_by_codec(streams: impl IntoIterator<Item = Stream>) -> Self {
        let mut kept: Vec<Stream> = Vec::new();
        for stream in streams {
            match kept.iter_mut().find(|s| s.codec == stream.codec) {
                Some(existing) => *existing = stream,
                None => kept.push(stream),
            }
        }
        Self { streams: kept }
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn video_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams
            .iter()
            .filter(|s| s.media_type == MediaType::Video)
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams
            .iter()
            .filter(|s| s.media_type == MediaType::Audio)
    }

    pub fn codecs(&self) -> impl Iterator<Item = Codec> + '_ {
        self.streams.iter().map(|s| s.codec)
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }
}

/// Timing of one packet handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFrameContext {
    pub pts: i64,
    pub dts: i64,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// Ingest request as decoded by the signaling layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(rename = "SRTHost", default)]
    pub srt_host: String,
    #[serde(rename = "SRTPort", default)]
    pub srt_port: u16,
    #[serde(rename = "SRTStreamID", default)]
    pub stream_id: String,
    /// Full ingest URL for non-SRT-host requests, e.g. `rtmp://host/app`.
    #[serde(rename = "StreamURL", default)]
    pub stream_url: String,
    #[serde(rename = "Offer", default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
}

impl RequestParams {
    pub fn srt(host: impl Into<String>, port: u16, stream_id: impl Into<String>) -> Self {
        Self {
            srt_host: host.into(),
            srt_port: port,
            stream_id: stream_id.into(),
            ..Default::default()
        }
    }

    pub fn url(url: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            stream_url: url.into(),
            stream_id: stream_id.into(),
            ..Default::default()
        }
    }

    pub fn with_offer(mut self, sdp: impl Into<String>) -> Self {
        self.offer = Some(SessionDescription {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream_id.is_empty() {
            return Err(Error::InvalidParams("SRTStreamID must not be empty"));
        }
        if !self.stream_url.is_empty() {
            return Ok(());
        }
        if self.srt_host.is_empty() {
            return Err(Error::InvalidParams("SRTHost must not be empty"));
        }
        if self.srt_port == 0 {
            return Err(Error::InvalidParams("SRTPort must be greater than 0"));
        }
        Ok(())
    }

    /// Scheme of `stream_url`, lowercased.
    pub fn url_scheme(&self) -> Option<String> {
        self.stream_url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
    }
}

impl fmt::Display for RequestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stream_url.is_empty() {
            write!(f, "srt://{}:{} streamid={}", self.srt_host, self.srt_port, self.stream_id)
        } else {
            write!(f, "{} streamid={}", self.stream_url, self.stream_id)
        }
    }
}

/// What the streamer opens: URL, container format and demuxer/protocol options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDescriptor {
    pub url: String,
    pub format: Option<String>,
    pub options: BTreeMap<String, String>,
}

impl InputDescriptor {
    pub fn dictionary(&self) -> ffmpeg_next::Dictionary<'static> {
        let mut dict = ffmpeg_next::Dictionary::new();
        for (key, value) in &self.options {
            dict.set(key, value);
        }
        dict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "metadata")]
    Metadata,
}

/// Out-of-band event for the sink's data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    #[serde(rename = "Type")]
    pub kind: MessageType,
    pub message: String,
}

impl Message {
    pub fn cue(cue: &Cue) -> Result<Self> {
        let message = serde_json::to_string(cue).map_err(anyhow::Error::from)?;
        Ok(Self {
            kind: MessageType::Metadata,
            message,
        })
    }

    pub fn stream(stream: &Stream) -> Self {
        Self {
            kind: MessageType::Metadata,
            message: stream.codec.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self).map_err(anyhow::Error::from)?)
    }
}
