//! Ingest connections used while probing.

use std::sync::Arc;

use async_trait::async_trait;
use ffmpeg_next::Dictionary;
use media_bus::avio::AvioReader;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::types::RequestParams;

#[async_trait]
pub trait IngestConnection: Send {
    /// Reads the next chunk of the transport stream. Returns 0 once the peer is gone.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

#[async_trait]
pub trait IngestTransport: Send + Sync {
    /// Connects for `params`. The connection cancels `cancel` when it is lost,
    /// and stops reading once `cancel` fires.
    async fn connect(
        &self,
        params: &RequestParams,
        cancel: CancellationToken,
    ) -> Result<Box<dyn IngestConnection>>;
}

/// SRT in live mode through FFmpeg's `srt://` protocol.
pub struct SrtTransport {
    config: Arc<GatewayConfig>,
}

impl SrtTransport {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    fn options(&self, params: &RequestParams) -> Dictionary<'static> {
        let mut options = Dictionary::new();
        options.set("streamid", &params.stream_id);
        options.set("transtype", "live");
        options.set("smoother", "live");
        options.set(
            "latency",
            &(self.config.srt_latency().as_micros()).to_string(),
        );
        options
    }
}

#[async_trait]
impl IngestTransport for SrtTransport {
    async fn connect(
        &self,
        params: &RequestParams,
        cancel: CancellationToken,
    ) -> Result<Box<dyn IngestConnection>> {
        params.validate()?;

        let url = format!("srt://{}:{}", params.srt_host, params.srt_port);
        log::info!("connecting to {} streamid={}", url, params.stream_id);
        let options = self.options(params);
        let reader = tokio::task::spawn_blocking(move || AvioReader::open(&url, options))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .map_err(|e| Error::Transport(format!("{:#}", e)))?;

        // wake up a read blocked on the socket once the probe is over
        let interrupter = reader.interrupter();
        let watch = cancel.clone();
        tokio::spawn(async move {
            watch.cancelled().await;
            interrupter.interrupt();
        });

        Ok(Box::new(SrtConnection {
            reader: Some(reader),
            cancel,
        }))
    }
}

struct SrtConnection {
    reader: Option<AvioReader>,
    cancel: CancellationToken,
}

impl SrtConnection {
    fn disconnected(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("srt connection closed by peer");
            self.cancel.cancel();
        }
    }
}

#[async_trait]
impl IngestConnection for SrtConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self
            .reader
            .take()
            .ok_or(Error::Transport("connection is closed".to_string()))?;

        let size = buf.len();
        let (reader, result) = tokio::task::spawn_blocking(move || {
            let mut chunk = vec![0u8; size];
            let result = reader.read(&mut chunk).map(|n| {
                chunk.truncate(n);
                chunk
            });
            (reader, result)
        })
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
        self.reader = Some(reader);

        match result {
            Ok(chunk) => {
                if chunk.is_empty() {
                    self.disconnected();
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Err(err) => {
                self.disconnected();
                Err(Error::Transport(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_params_before_connecting() {
        let transport = SrtTransport::new(Arc::new(GatewayConfig::default()));
        let result = transport
            .connect(&RequestParams::srt("", 40052, "id"), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidParams(_))));
    }

    #[test]
    fn test_live_options() {
        let transport = SrtTransport::new(Arc::new(GatewayConfig::default()));
        let options = transport.options(&RequestParams::srt("host", 40052, "abc"));
        assert_eq!(options.get("streamid"), Some("abc"));
        assert_eq!(options.get("transtype"), Some("live"));
        assert_eq!(options.get("latency"), Some("300000"));
    }
}
