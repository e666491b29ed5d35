use media_bus::{captions::CaptionError, h264::BitstreamError, ts::DemuxError};

use crate::types::Codec;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request params: {0}")]
    InvalidParams(&'static str),
    #[error("malformed bitstream: {0}")]
    MalformedBitstream(#[from] BitstreamError),
    #[error("caption decode error: {0}")]
    CaptionDecode(#[from] CaptionError),
    #[error("request {0}: there is no prober")]
    MissingProber(String),
    #[error("request {0}: there is no streamer")]
    MissingStreamer(String),
    #[error("input format unavailable: {0}")]
    FormatUnavailable(String),
    #[error("decoder unavailable: {0}")]
    DecoderUnavailable(String),
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),
    #[error("filter graph: {0}")]
    Filter(String),
    #[error("unsupported codec {0}")]
    UnsupportedCodec(Codec),
    #[error("transport: {0}")]
    Transport(String),
    #[error("demux: {0}")]
    Demux(#[from] DemuxError),
    #[error("sink: {0}")]
    Sink(String),
    #[error(transparent)]
    Media(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
