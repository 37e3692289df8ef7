use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use webview_bridge::config::Config;
use webview_bridge::host_api::{HostApi, SendOptions};
use webview_bridge::ipc::host::BootstrapInHostRequest;
use webview_bridge::ipc::webview::{
    HostDidChangeActiveEditorNotification, HostDidChangeEditorSelectionNotification,
    ShowCodemarkNotification,
};
use webview_bridge::transport::{IpcHost, WebSocketHost, find_host, provide_host_factory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let token = CancellationToken::new();
    let config = Config::load()?;

    let cancel_token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down");
        cancel_token.cancel();
    });

    let host = WebSocketHost::connect(&config.host.url, token.clone()).await?;
    provide_host_factory(move || Ok(host.clone() as Arc<dyn IpcHost>));
    let api = HostApi::init(find_host()?, config.requests.clone());

    let _active = api.on::<HostDidChangeActiveEditorNotification, _>(|params| {
        match params.editor {
            Some(editor) => info!(uri = %editor.uri, "active editor changed"),
            None => info!("no active editor"),
        }
    });
    let _selection = api.on::<HostDidChangeEditorSelectionNotification, _>(|params| {
        debug!(uri = %params.uri, selections = params.selections.len(), "editor selection changed");
    });
    let _codemark = api.on::<ShowCodemarkNotification, _>(|params| {
        info!(codemark_id = %params.codemark_id, "codemark requested");
    });

    tokio::select! {
        _ = token.cancelled() => {}
        bootstrap = api.send::<BootstrapInHostRequest>(&(), SendOptions::default()) => {
            match bootstrap {
                Ok(response) => info!(version = %response.version, "bootstrapped from host"),
                Err(e) => error!("bootstrap failed: {e}"),
            }
        }
    }

    api.track("Webview Started", None);

    token.cancelled().await;
    api.shutdown();
    info!(pending = api.requests().len(), "stopped");

    Ok(())
}
