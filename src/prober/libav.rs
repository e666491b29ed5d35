use async_trait::async_trait;
use media_bus::avio::Interrupter;
use media_bus::input::AvInput;

use super::Prober;
use crate::error::{Error, Result};
use crate::types::{InputDescriptor, MediaType, RequestParams, Stream, StreamInfo};

/// Probes any URL FFmpeg can open by letting the demuxer read stream info.
#[derive(Debug, Default)]
pub struct LibavProber;

#[async_trait]
impl Prober for LibavProber {
    fn name(&self) -> &'static str {
        "libav"
    }

    fn matches(&self, params: &RequestParams) -> bool {
        matches!(params.url_scheme().as_deref(), Some("rtmp" | "rtmps" | "srt"))
    }

    async fn stream_info(
        &self,
        _params: &RequestParams,
        input: &InputDescriptor,
    ) -> Result<StreamInfo> {
        let input = input.clone();
        let streams = tokio::task::spawn_blocking(move || -> Result<Vec<Stream>> {
            let av_input = AvInput::open(
                &input.url,
                input.format.as_deref(),
                input.dictionary(),
                Interrupter::new(),
            )
            .map_err(|e| Error::FormatUnavailable(format!("{}: {:#}", input.url, e)))?;
            Ok(av_input
                .streams()
                .iter()
                .map(Stream::from)
                .filter(|s| s.media_type != MediaType::Unknown)
                .collect())
        })
        .await
        .map_err(anyhow::Error::from)??;

        let info = StreamInfo::dedup_by_codec(streams);
        log::info!("probed {} streams: {:?}", info.len(), info.streams());
        Ok(info)
    }
}
