use async_trait::async_trait;

use crate::error::Result;
use crate::types::{InputDescriptor, RequestParams, StreamInfo};

mod libav;
mod srt_mpegts;

pub use libav::LibavProber;
pub use srt_mpegts::{SrtMpegTsProber, probe};

/// Discovers the streams of an ingest before a recipe is chosen.
#[async_trait]
pub trait Prober: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, params: &RequestParams) -> bool;

    async fn stream_info(
        &self,
        params: &RequestParams,
        input: &InputDescriptor,
    ) -> Result<StreamInfo>;
}
