use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod page;
mod req;
mod resp;
mod router;
mod r#static;

use req::Method;
use router::Router;
use r#static::StaticHandler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::Config::from_args(std::env::args().skip(1))?;

    let servlet = Arc::new(StaticHandler::new(
        cfg.root.clone(),
        cfg.video_page.clone(),
        cfg.chunk_size,
    ));
    let router = Arc::new(
        Router::new()
            .route(Method::Get, servlet.clone())
            .route(Method::Head, servlet),
    );

    let listener = TcpListener::bind(cfg.listen).await?;
    info!(
        "Http Server running at http://localhost:{}/",
        listener.local_addr()?.port()
    );

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(?e, "failed to accept connection");
                continue;
            }
        };
        let router = router.clone();

        tokio::spawn(async move {
            tracing::debug!(?addr, "new connection");
            router::serve_connection(stream, &router).await;
        });
    }
}
