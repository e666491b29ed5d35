use std::ffi::CString;
use std::io::ErrorKind;
use std::ptr;

use ffmpeg_next::{Dictionary, codec::packet::Packet, ffi};

use crate::{avio::Interrupter, packet::RawPacket, stream::AvStream};

/// Outcome of one demuxer read.
pub enum ReadStatus {
    Packet(RawPacket),
    /// Nothing was available before the read timed out.
    TryAgain,
    EndOfStream,
}

pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: Vec<AvStream>,
    // read by the interrupt callback until `inner` is closed
    _interrupter: Interrupter,
}

impl AvInput {
    /// Resolve input format by name (e.g. "mpegts", "flv") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<*const ffi::AVInputFormat> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(ptr)
    }

    /// Opens `url` and reads enough of it to fill in the stream parameters.
    /// Every blocking call, including later reads, returns once `interrupter`
    /// fires.
    pub fn open(
        url: &str,
        format: Option<&str>,
        options: Dictionary,
        interrupter: Interrupter,
    ) -> anyhow::Result<Self> {
        let curl =
            CString::new(url).map_err(|e| anyhow::anyhow!("invalid url {:?}: {}", url, e))?;
        let fmt = match format {
            Some(name) => Self::find_input_format(name)?,
            None => ptr::null(),
        };

        let input = unsafe {
            let mut ps = ffi::avformat_alloc_context();
            if ps.is_null() {
                anyhow::bail!("open {}: cannot allocate format context", url);
            }
            (*ps).interrupt_callback = interrupter.callback();

            let mut opts = options.disown();
            let ret = ffi::avformat_open_input(&mut ps, curl.as_ptr(), fmt, &mut opts);
            let unused = Dictionary::own(opts);
            for (key, _) in unused.iter() {
                log::warn!("{}: unused option {}", url, key);
            }
            // a failed open frees the context
            if ret < 0 {
                anyhow::bail!("open {}: {}", url, ffmpeg_next::Error::from(ret));
            }

            let ret = ffi::avformat_find_stream_info(ps, ptr::null_mut());
            if ret < 0 {
                ffi::avformat_close_input(&mut ps);
                anyhow::bail!("find stream info {}: {}", url, ffmpeg_next::Error::from(ret));
            }
            ffmpeg_next::format::context::Input::wrap(ps)
        };

        let streams = input.streams().map(AvStream::from).collect();
        Ok(Self {
            inner: input,
            streams,
            _interrupter: interrupter,
        })
    }

    pub fn streams(&self) -> &[AvStream] {
        &self.streams
    }

    pub fn read_packet(&mut self) -> Result<ReadStatus, ffmpeg_next::Error> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.inner) {
            Ok(()) => {
                let Some(stream) = self.streams.get(packet.stream()) else {
                    // streams added after open are not tracked
                    return Ok(ReadStatus::TryAgain);
                };
                let time_base = stream.time_base();
                Ok(ReadStatus::Packet(RawPacket::from((packet, time_base))))
            }
            Err(ffmpeg_next::Error::Eof) => Ok(ReadStatus::EndOfStream),
            Err(ffmpeg_next::Error::Other { errno }) if is_transient(errno) => {
                Ok(ReadStatus::TryAgain)
            }
            Err(err) => Err(err),
        }
    }
}

fn is_transient(errno: i32) -> bool {
    matches!(
        std::io::Error::from_raw_os_error(errno).kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}
