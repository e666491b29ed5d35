//! Registry of protocol adapters: probers and streamers picked per request.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::prober::{LibavProber, Prober, SrtMpegTsProber};
use crate::recipe::{FixedRecipePlanner, Recipe, RecipePlanner};
use crate::sdp::client_stream_info;
use crate::session::Session;
use crate::streamer::{LibavStreamer, Streamer};
use crate::transport::SrtTransport;
use crate::types::{InputDescriptor, RequestParams, StreamInfo};

/// Adapters are tried in registration order; the first match wins.
pub struct Engine {
    probers: Vec<Arc<dyn Prober>>,
    streamers: Vec<Arc<dyn Streamer>>,
    planner: Arc<dyn RecipePlanner>,
    config: Arc<GatewayConfig>,
}

impl Engine {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            probers: Vec::new(),
            streamers: Vec::new(),
            planner: Arc::new(FixedRecipePlanner),
            config,
        }
    }

    /// SRT/MPEG-TS probing first, libav probing as the fallback, libav streaming.
    pub fn with_default_adapters(config: Arc<GatewayConfig>) -> Self {
        let transport = Arc::new(SrtTransport::new(config.clone()));
        Self::new(config.clone())
            .with_prober(SrtMpegTsProber::new(config, transport))
            .with_prober(LibavProber)
            .with_streamer(LibavStreamer)
    }

    pub fn with_prober(mut self, prober: impl Prober + 'static) -> Self {
        self.probers.push(Arc::new(prober));
        self
    }

    pub fn with_streamer(mut self, streamer: impl Streamer + 'static) -> Self {
        self.streamers.push(Arc::new(streamer));
        self
    }

    pub fn with_planner(mut self, planner: impl RecipePlanner + 'static) -> Self {
        self.planner = Arc::new(planner);
        self
    }

    pub fn engine_for(&self, params: &RequestParams) -> Result<EngineSelection> {
        let prober = self
            .probers
            .iter()
            .find(|p| p.matches(params))
            .cloned()
            .ok_or_else(|| Error::MissingProber(params.to_string()))?;
        let streamer = self
            .streamers
            .iter()
            .find(|s| s.matches(params))
            .cloned()
            .ok_or_else(|| Error::MissingStreamer(params.to_string()))?;

        log::info!(
            "request {}: prober={} streamer={}",
            params,
            prober.name(),
            streamer.name()
        );
        Ok(EngineSelection {
            params: params.clone(),
            prober,
            streamer,
            planner: self.planner.clone(),
            config: self.config.clone(),
        })
    }
}

/// The adapters chosen for one request.
pub struct EngineSelection {
    params: RequestParams,
    prober: Arc<dyn Prober>,
    streamer: Arc<dyn Streamer>,
    planner: Arc<dyn RecipePlanner>,
    config: Arc<GatewayConfig>,
}

impl EngineSelection {
    pub fn prober(&self) -> &dyn Prober {
        self.prober.as_ref()
    }

    pub fn streamer(&self) -> &dyn Streamer {
        self.streamer.as_ref()
    }

    /// What the streamer opens for this request.
    pub fn input_descriptor(&self) -> Result<InputDescriptor> {
        let params = &self.params;
        params.validate()?;

        let rw_timeout = self.config.read_timeout().as_micros().to_string();
        if !params.srt_host.is_empty() {
            let options = BTreeMap::from([
                ("streamid".to_string(), params.stream_id.clone()),
                ("transtype".to_string(), "live".to_string()),
                ("smoother".to_string(), "live".to_string()),
                (
                    "latency".to_string(),
                    self.config.srt_latency().as_micros().to_string(),
                ),
                ("rw_timeout".to_string(), rw_timeout),
            ]);
            return Ok(InputDescriptor {
                url: format!("srt://{}:{}", params.srt_host, params.srt_port),
                format: Some("mpegts".to_string()),
                options,
            });
        }

        match params.url_scheme().as_deref() {
            Some("rtmp" | "rtmps") => Ok(InputDescriptor {
                url: format!(
                    "{}/{}",
                    params.stream_url.trim_end_matches('/'),
                    params.stream_id
                ),
                format: None,
                options: BTreeMap::from([
                    ("rtmp_live".to_string(), "live".to_string()),
                    ("rw_timeout".to_string(), rw_timeout),
                ]),
            }),
            Some("srt") => Ok(InputDescriptor {
                url: params.stream_url.clone(),
                format: Some("mpegts".to_string()),
                options: BTreeMap::from([
                    ("streamid".to_string(), params.stream_id.clone()),
                    ("transtype".to_string(), "live".to_string()),
                    ("rw_timeout".to_string(), rw_timeout),
                ]),
            }),
            _ => Err(Error::InvalidParams("unsupported stream")),
        }
    }

    pub async fn server_ingredients(&self, input: &InputDescriptor) -> Result<StreamInfo> {
        log::info!("probing {} with {}", self.params, self.prober.name());
        let info = self.prober.stream_info(&self.params, input).await?;
        if info.is_empty() {
            log::warn!("no streams discovered for {}", self.params);
        }
        Ok(info)
    }

    /// Codecs the client offered, empty when the request carries no offer.
    pub fn client_ingredients(&self) -> StreamInfo {
        self.params
            .offer
            .as_ref()
            .map(|offer| client_stream_info(&offer.sdp))
            .unwrap_or_default()
    }

    pub fn recipe_for(
        &self,
        input: InputDescriptor,
        server: &StreamInfo,
        client: &StreamInfo,
    ) -> Result<Recipe> {
        self.planner.recipe_for(input, server, client)
    }

    pub async fn serve(&self, session: Session) {
        self.streamer.stream(session).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::recipe::MediaTask;
    use crate::types::{Codec, MediaType, Stream};

    struct Named {
        name: &'static str,
        host: &'static str,
    }

    #[async_trait]
    impl Prober for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, params: &RequestParams) -> bool {
            self.host == "*" || params.srt_host == self.host
        }

        async fn stream_info(
            &self,
            _params: &RequestParams,
            _input: &InputDescriptor,
        ) -> Result<StreamInfo> {
            Ok(StreamInfo::new(vec![Stream {
                codec: Codec::H264,
                media_type: MediaType::Video,
                id: 256,
                index: 0,
            }]))
        }
    }

    #[async_trait]
    impl Streamer for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, params: &RequestParams) -> bool {
            self.host == "*" || params.srt_host == self.host
        }

        async fn stream(&self, session: Session) {
            session.sink().on_close();
        }
    }

    fn engine() -> Engine {
        Engine::new(Arc::new(GatewayConfig::default()))
            .with_prober(Named { name: "a", host: "a.local" })
            .with_prober(Named { name: "any", host: "*" })
            .with_prober(Named { name: "a2", host: "a.local" })
            .with_streamer(Named { name: "b", host: "b.local" })
    }

    #[test]
    fn test_first_match_wins() -> anyhow::Result<()> {
        let engine = engine().with_streamer(Named { name: "any", host: "*" });

        let selection = engine.engine_for(&RequestParams::srt("a.local", 1, "key"))?;
        assert_eq!(selection.prober().name(), "a");
        assert_eq!(selection.streamer().name(), "any");

        let selection = engine.engine_for(&RequestParams::srt("b.local", 1, "key"))?;
        assert_eq!(selection.prober().name(), "any");
        assert_eq!(selection.streamer().name(), "b");
        Ok(())
    }

    #[test]
    fn test_missing_adapters() {
        let engine = Engine::new(Arc::new(GatewayConfig::default()));
        let result = engine.engine_for(&RequestParams::srt("a.local", 1, "key"));
        assert!(matches!(result, Err(Error::MissingProber(_))));

        let result = engine().engine_for(&RequestParams::srt("a.local", 1, "key"));
        assert!(matches!(result, Err(Error::MissingStreamer(_))));
    }

    #[test]
    fn test_selection_always_matches() {
        let engine = engine().with_streamer(Named { name: "a", host: "a.local" });
        for host in ["a.local", "b.local", "c.local", ""] {
            let params = RequestParams::srt(host, 1, "key");
            if let Ok(selection) = engine.engine_for(&params) {
                assert!(selection.prober().matches(&params));
                assert!(selection.streamer().matches(&params));
            }
        }
    }

    #[test]
    fn test_default_adapters() -> anyhow::Result<()> {
        let engine = Engine::with_default_adapters(Arc::new(GatewayConfig::default()));

        let selection = engine.engine_for(&RequestParams::srt("localhost", 40052, "key"))?;
        assert_eq!(selection.prober().name(), "srt-mpegts");
        assert_eq!(selection.streamer().name(), "libav");

        let selection = engine.engine_for(&RequestParams::url("rtmp://localhost/live", "key"))?;
        assert_eq!(selection.prober().name(), "libav");

        let result = engine.engine_for(&RequestParams::url("http://localhost/a.ts", "key"));
        assert!(matches!(result, Err(Error::MissingProber(_))));
        Ok(())
    }

    #[test]
    fn test_srt_input_descriptor() -> anyhow::Result<()> {
        let engine = Engine::with_default_adapters(Arc::new(GatewayConfig::default()));
        let input = engine
            .engine_for(&RequestParams::srt("localhost", 40052, "live/cam"))?
            .input_descriptor()?;

        assert_eq!(input.url, "srt://localhost:40052");
        assert_eq!(input.format.as_deref(), Some("mpegts"));
        assert_eq!(input.options["streamid"], "live/cam");
        assert_eq!(input.options["transtype"], "live");
        assert_eq!(input.options["smoother"], "live");
        assert_eq!(input.options["latency"], "300000");
        assert_eq!(input.options["rw_timeout"], "1000000");
        Ok(())
    }

    #[test]
    fn test_rtmp_input_descriptor() -> anyhow::Result<()> {
        let engine = Engine::with_default_adapters(Arc::new(GatewayConfig::default()));
        let input = engine
            .engine_for(&RequestParams::url("rtmp://localhost/live/", "cam"))?
            .input_descriptor()?;

        assert_eq!(input.url, "rtmp://localhost/live/cam");
        assert_eq!(input.format, None);
        assert_eq!(input.options["rtmp_live"], "live");
        Ok(())
    }

    struct BypassEverything;

    impl RecipePlanner for BypassEverything {
        fn recipe_for(
            &self,
            input: InputDescriptor,
            server: &StreamInfo,
            _client: &StreamInfo,
        ) -> Result<Recipe> {
            let video = server.video_streams().next().map_or(Codec::H264, |s| s.codec);
            Ok(Recipe {
                input,
                video: MediaTask::bypass(video),
                audio: MediaTask::bypass(Codec::Aac),
            })
        }
    }

    #[tokio::test]
    async fn test_custom_planner() -> anyhow::Result<()> {
        let engine = engine()
            .with_streamer(Named { name: "any", host: "*" })
            .with_planner(BypassEverything);
        let selection = engine.engine_for(&RequestParams::srt("a.local", 1, "key"))?;
        let input = InputDescriptor::default();
        let server = selection.server_ingredients(&input).await?;
        let recipe = selection.recipe_for(input, &server, &selection.client_ingredients())?;

        assert!(recipe.audio.is_bypass());
        assert_eq!(recipe.audio.codec(), Codec::Aac);
        assert_eq!(recipe.video.codec(), Codec::H264);
        Ok(())
    }

    #[test]
    fn test_invalid_params_rejected_before_io() {
        let engine = Engine::with_default_adapters(Arc::new(GatewayConfig::default()));
        let selection = engine.engine_for(&RequestParams::srt("localhost", 0, "cam"));
        let result = selection.and_then(|s| s.input_descriptor());
        assert!(matches!(result, Err(Error::InvalidParams(_))));
    }

    #[test]
    fn test_client_ingredients() -> anyhow::Result<()> {
        let engine = Engine::with_default_adapters(Arc::new(GatewayConfig::default()));
        let selection = engine.engine_for(&RequestParams::srt("localhost", 40052, "cam"))?;
        assert!(selection.client_ingredients().is_empty());

        let params = RequestParams::srt("localhost", 40052, "cam").with_offer(
            "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=rtpmap:111 opus/48000/2\r\n",
        );
        let codecs: Vec<_> = engine.engine_for(&params)?.client_ingredients().codecs().collect();
        assert_eq!(codecs, vec![Codec::Opus]);
        Ok(())
    }
}
