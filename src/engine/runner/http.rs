use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::thread;

use axum::Router;
use axum::http::{HeaderValue, header};
use console::style;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::Website;
use crate::error::WatchError;

/// Binds the dev server port and serves the site from a background thread
/// until `shutdown` resolves.
///
/// Binding happens before the thread starts, so a port that's already taken
/// is reported right away.
pub fn start<F>(site: &Website, shutdown: F) -> Result<thread::JoinHandle<Result<(), WatchError>>, WatchError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = site.config.port;
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))?;
    listener.set_nonblocking(true)?;

    let router = router(site);

    info!(url = %style(format!("http://localhost:{port}/")).yellow(), "starting a HTTP server");

    Ok(thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(listener, router, shutdown))
    }))
}

async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), WatchError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::from_std(listener)?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Requests resolve against staging first, then the source directory, then
/// the public directory. The shared route is mapped to its own directory.
/// Nothing may be cached, so an edit always shows up on the next load.
pub(crate) fn router(site: &Website) -> Router {
    let files = ServeDir::new(site.staging())
        .fallback(ServeDir::new(site.source()).fallback(ServeDir::new(site.public())));

    let route = site.config.shared.route.trim_end_matches('/');

    Router::new()
        .nest_service(route, ServeDir::new(site.shared()))
        .fallback_service(files)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
