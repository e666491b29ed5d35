use std::sync::Arc;

use live_gateway::config::config;
use live_gateway::engine::Engine;
use live_gateway::session::Session;
use live_gateway::sink::LoggingSink;
use live_gateway::types::RequestParams;
use tokio_util::sync::CancellationToken;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("media_bus", log::LevelFilter::Debug)
        .init();
}

fn request_from_args() -> anyhow::Result<RequestParams> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host, port, stream_id] = args.as_slice() else {
        anyhow::bail!("usage: live-gateway <host> <port> <stream id>");
    };
    let port = port
        .parse::<u16>()
        .map_err(|e| anyhow::anyhow!("invalid port {}: {}", port, e))?;
    Ok(RequestParams::srt(host.as_str(), port, stream_id.as_str()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    media_bus::init()?;
    let params = request_from_args()?;
    let config = Arc::new(config().clone());

    let engine = Engine::with_default_adapters(config);
    let selection = engine.engine_for(&params)?;
    let input = selection.input_descriptor()?;
    let server = selection.server_ingredients(&input).await?;
    let client = selection.client_ingredients();
    let recipe = selection.recipe_for(input, &server, &client)?;
    log::info!("recipe: {:?}", recipe);

    let shutdown = CancellationToken::new();
    let session = Session::new(recipe, server, Arc::new(LoggingSink)).with_parent(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("ctrl-c received, stopping");
            shutdown.cancel();
        }
    });

    selection.serve(session).await;
    Ok(())
}
