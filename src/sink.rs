use crate::error::Error;
use crate::types::{MediaFrameContext, Message, Stream};

/// Receiver of a session's media, implemented by the real-time transport.
///
/// Callbacks run on the streaming thread. An error from a frame callback
/// aborts the session.
pub trait MediaSink: Send + Sync {
    fn on_stream(&self, stream: &Stream) -> anyhow::Result<()>;

    fn on_video_frame(&self, data: &[u8], ctx: MediaFrameContext) -> anyhow::Result<()>;

    fn on_audio_frame(&self, data: &[u8], ctx: MediaFrameContext) -> anyhow::Result<()>;

    /// Caption cues and stream announcements.
    fn on_metadata(&self, _message: &Message) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_error(&self, error: &Error);

    /// Called exactly once, after the last frame.
    fn on_close(&self);
}

/// Logs every event; used by the demo binary.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl MediaSink for LoggingSink {
    fn on_stream(&self, stream: &Stream) -> anyhow::Result<()> {
        log::info!(
            "stream {} {:?} id={} index={}",
            stream.codec,
            stream.media_type,
            stream.id,
            stream.index
        );
        Ok(())
    }

    fn on_video_frame(&self, data: &[u8], ctx: MediaFrameContext) -> anyhow::Result<()> {
        log::debug!(
            "video {} bytes pts={} dts={} duration={:?}",
            data.len(),
            ctx.pts,
            ctx.dts,
            ctx.duration
        );
        Ok(())
    }

    fn on_audio_frame(&self, data: &[u8], ctx: MediaFrameContext) -> anyhow::Result<()> {
        log::debug!(
            "audio {} bytes pts={} dts={} duration={:?}",
            data.len(),
            ctx.pts,
            ctx.dts,
            ctx.duration
        );
        Ok(())
    }

    fn on_metadata(&self, message: &Message) -> anyhow::Result<()> {
        log::info!("metadata {}", message.message);
        Ok(())
    }

    fn on_error(&self, error: &Error) {
        log::error!("session error: {}", error);
    }

    fn on_close(&self) {
        log::info!("session closed");
    }
}
