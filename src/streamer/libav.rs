use async_trait::async_trait;
use media_bus::avio::Interrupter;

use super::Streamer;
use super::pipeline::{Exit, Pipeline};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::RequestParams;

/// Streams anything FFmpeg can demux: SRT, RTMP or a plain file.
#[derive(Debug, Default)]
pub struct LibavStreamer;

impl LibavStreamer {
    fn run_blocking(session: &Session, interrupter: Interrupter) -> Result<Exit> {
        let mut pipeline = Pipeline::open(session, interrupter)?;
        pipeline.run()
    }
}

#[async_trait]
impl Streamer for LibavStreamer {
    fn name(&self) -> &'static str {
        "libav"
    }

    fn matches(&self, params: &RequestParams) -> bool {
        !params.srt_host.is_empty()
            || matches!(params.url_scheme().as_deref(), Some("rtmp" | "rtmps" | "srt"))
    }

    async fn stream(&self, session: Session) {
        let sink = session.sink();
        if session.is_cancelled() {
            log::info!("session cancelled before streaming started");
            sink.on_close();
            return;
        }

        // wakes up a read blocked on the network once the session is cancelled
        let interrupter = Interrupter::new();
        let watch = session.cancel_token();
        let wake = interrupter.clone();
        let watcher = tokio::spawn(async move {
            watch.cancelled().await;
            wake.interrupt();
        });

        let worker = session.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            match Self::run_blocking(&worker, interrupter) {
                Err(e) if worker.is_cancelled() => {
                    log::debug!("error after cancellation: {}", e);
                    Ok(Exit::Cancelled)
                }
                other => other,
            }
        })
        .await
        .map_err(|e| Error::Media(anyhow::Error::from(e)))
        .and_then(|result| result);
        watcher.abort();

        match outcome {
            Ok(Exit::Cancelled) => log::info!("streaming cancelled"),
            Ok(Exit::EndOfStream) => log::info!("ingest reached end of stream"),
            Err(e) => {
                log::error!("streaming failed: {}", e);
                sink.on_error(&e);
            }
        }
        sink.on_close();
    }
}

#[cfg(test)]
#[path = "libav_test.rs"]
mod tests;
