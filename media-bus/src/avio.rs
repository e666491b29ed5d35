//! Byte-level reads through FFmpeg's protocol layer (`srt://`, `udp://`, ...).

use std::ffi::{CString, c_int, c_void};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next::{Dictionary, ffi};

unsafe extern "C" fn interrupt_requested(opaque: *mut c_void) -> c_int {
    let flag = unsafe { &*(opaque as *const AtomicBool) };
    flag.load(Ordering::Acquire) as c_int
}

/// Aborts blocking FFmpeg calls of the contexts it was installed in.
#[derive(Clone, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// The callback must not outlive `self`.
    pub(crate) fn callback(&self) -> ffi::AVIOInterruptCB {
        ffi::AVIOInterruptCB {
            callback: Some(interrupt_requested),
            opaque: Arc::as_ptr(&self.flag) as *mut c_void,
        }
    }
}

pub struct AvioReader {
    ctx: *mut ffi::AVIOContext,
    // read by the interrupt callback until the context is closed
    interrupter: Interrupter,
}

unsafe impl Send for AvioReader {}

impl AvioReader {
    /// Opens `url` for reading. Protocol options such as `streamid`,
    /// `latency` or `rw_timeout` go in `options`.
    pub fn open(url: &str, options: Dictionary) -> anyhow::Result<Self> {
        let curl =
            CString::new(url).map_err(|e| anyhow::anyhow!("invalid url {:?}: {}", url, e))?;
        let interrupter = Interrupter::new();
        let callback = interrupter.callback();

        let mut ctx: *mut ffi::AVIOContext = ptr::null_mut();
        let mut opts = options.disown();
        let ret = unsafe {
            ffi::avio_open2(
                &mut ctx,
                curl.as_ptr(),
                ffi::AVIO_FLAG_READ as c_int,
                &callback,
                &mut opts,
            )
        };
        // options the protocol did not consume
        let unused = unsafe { Dictionary::own(opts) };
        for (key, _) in unused.iter() {
            log::warn!("{}: unused option {}", url, key);
        }

        if ret < 0 || ctx.is_null() {
            return Err(anyhow::anyhow!(
                "open {}: {}",
                url,
                ffmpeg_next::Error::from(ret)
            ));
        }
        Ok(Self { ctx, interrupter })
    }

    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Reads whatever is available, at most `buf.len()` bytes. Returns 0 at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ffmpeg_next::Error> {
        let size = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
        let ret = unsafe { ffi::avio_read_partial(self.ctx, buf.as_mut_ptr(), size) };
        if ret >= 0 {
            return Ok(ret as usize);
        }
        match ffmpeg_next::Error::from(ret) {
            ffmpeg_next::Error::Eof => Ok(0),
            err => Err(err),
        }
    }
}

impl Drop for AvioReader {
    fn drop(&mut self) {
        unsafe {
            ffi::avio_closep(&mut self.ctx);
        }
    }
}
