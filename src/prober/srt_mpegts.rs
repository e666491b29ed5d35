use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use media_bus::ts::{DemuxData, TsDemuxer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Prober;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::transport::{IngestConnection, IngestTransport};
use crate::types::{Codec, InputDescriptor, RequestParams, Stream, StreamInfo};

/// Probes MPEG-TS carried over SRT by reading the PMT out of a bounded
/// window of transport reads.
pub struct SrtMpegTsProber {
    config: Arc<GatewayConfig>,
    transport: Arc<dyn IngestTransport>,
}

impl SrtMpegTsProber {
    pub fn new(config: Arc<GatewayConfig>, transport: Arc<dyn IngestTransport>) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl Prober for SrtMpegTsProber {
    fn name(&self) -> &'static str {
        "srt-mpegts"
    }

    fn matches(&self, params: &RequestParams) -> bool {
        !params.srt_host.is_empty()
    }

    async fn stream_info(
        &self,
        params: &RequestParams,
        _input: &InputDescriptor,
    ) -> Result<StreamInfo> {
        let cancel = CancellationToken::new();
        let connection = self.transport.connect(params, cancel.clone()).await?;
        probe(
            connection,
            cancel,
            self.config.probing_size,
            self.config.srt_read_buffer_size,
        )
        .await
    }
}

/// Copies up to `probing_size` reads from `connection` into a pipe while the
/// demux loop looks for elementary streams in it.
///
/// Ends when the reader is done or `cancel` fires. A transport read error
/// only shortens the window; a demux error fails the probe.
pub async fn probe(
    mut connection: Box<dyn IngestConnection>,
    cancel: CancellationToken,
    probing_size: usize,
    buffer_size: usize,
) -> Result<StreamInfo> {
    let _stop = cancel.clone().drop_guard();
    let (tx, mut rx) = mpsc::channel::<Bytes>(probing_size.max(1));

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        let mut buf = vec![0u8; buffer_size];
        for _ in 0..probing_size {
            let read = tokio::select! {
                biased;
                _ = reader_cancel.cancelled() => break,
                read = connection.read(&mut buf) => read,
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    log::error!("probe read error: {}", e);
                    break;
                }
            };
            if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                break;
            }
        }
        log::info!("done probing");
        drop(tx);
        reader_cancel.cancel();
    });

    let mut demuxer = TsDemuxer::new();
    let mut found: Vec<Stream> = Vec::new();
    let outcome = loop {
        let chunk = tokio::select! {
            biased;
            chunk = rx.recv() => chunk,
            _ = cancel.cancelled() => None,
        };
        let Some(chunk) = chunk else {
            break Ok(());
        };

        match demuxer.push(&chunk) {
            Ok(tables) => {
                for table in tables {
                    if let DemuxData::Pmt { streams, .. } = table {
                        found.extend(streams.iter().enumerate().map(|(index, es)| {
                            let (codec, media_type) = Codec::from_ts_stream_type(es.stream_type);
                            Stream {
                                codec,
                                media_type,
                                id: es.pid,
                                index: index as u16,
                            }
                        }));
                    }
                }
            }
            Err(e) => break Err(e),
        }
    };
    reader.abort();
    outcome?;

    let info = StreamInfo::dedup_by_codec(found);
    log::info!("probed {} streams: {:?}", info.len(), info.streams());
    Ok(info)
}

#[cfg(test)]
#[path = "srt_mpegts_test.rs"]
mod srt_mpegts_test;
