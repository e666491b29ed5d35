use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::recipe::Recipe;
use crate::sink::MediaSink;
use crate::types::StreamInfo;

/// Everything one streaming run owns: the recipe, the probed streams, the
/// sink and the cancellation token shared with whoever may stop it.
#[derive(Clone)]
pub struct Session {
    cancel: CancellationToken,
    recipe: Recipe,
    server: StreamInfo,
    sink: Arc<dyn MediaSink>,
}

impl Session {
    pub fn new(recipe: Recipe, server: StreamInfo, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            recipe,
            server,
            sink,
        }
    }

    /// Ties the session to a parent token, e.g. the server's shutdown token.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn server_streams(&self) -> &StreamInfo {
        &self.server
    }

    pub fn sink(&self) -> Arc<dyn MediaSink> {
        self.sink.clone()
    }
}
