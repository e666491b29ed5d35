use async_trait::async_trait;

use crate::session::Session;
use crate::types::RequestParams;

mod libav;
mod pipeline;
pub mod timing;

pub use libav::LibavStreamer;

/// Runs a session's recipe until it is cancelled, the ingest ends or it fails.
///
/// The session's sink sees `on_close` exactly once when `stream` returns,
/// preceded by `on_error` if the run failed.
#[async_trait]
pub trait Streamer: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, params: &RequestParams) -> bool;

    async fn stream(&self, session: Session);
}
