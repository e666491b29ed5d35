/// Registers FFmpeg components (formats, protocols, network). Call once at
/// startup before opening inputs.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

/// Result of pulling from a decoder, filter graph or encoder.
#[derive(Debug)]
pub enum Drain<T> {
    Ready(T),
    /// More input is needed before anything can be pulled.
    TryAgain,
    EndOfStream,
}

impl<T> Drain<T> {
    pub(crate) fn from_result(result: Result<T, ffmpeg_next::Error>) -> anyhow::Result<Self> {
        match result {
            Ok(value) => Ok(Drain::Ready(value)),
            Err(ffmpeg_next::Error::Eof) => Ok(Drain::EndOfStream),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(Drain::TryAgain)
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub mod avio;
pub mod bsf;
pub mod captions;
pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod frame;
pub mod h264;
pub mod input;
pub mod packet;
pub mod stream;
pub mod ts;
