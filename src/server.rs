/// HTTP server setup and routing
use crate::{
    api::{self, health::runtime_config},
    context::AppContext,
    error::{ServerError, ServerResult},
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = ctx.config.service.allowed_origin.as_deref().and_then(cors_layer);

    let router = Router::new()
        .route("/runtime-config.js", get(runtime_config))
        .nest("/api", api::routes())
        .fallback(api::not_found)
        .with_state(ctx)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    // Without a configured origin no CORS headers are sent at all
    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = match HeaderValue::from_str(origin.trim_end_matches('/')) {
        Ok(origin) => origin,
        Err(e) => {
            warn!("Ignoring invalid EDS_SHARE_ALLOWED_ORIGIN {:?}: {}", origin, e);
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> ServerResult<()> {
    let addr = listen_addr(&ctx.config.service.addr);

    info!("Share server listening on {}", addr);
    info!("   Auth mode: {}", if ctx.gate.oidc_enabled() { "oidc" } else { "shared secret" });
    info!("   Version retention: {}", ctx.config.storage.share_versions_max);

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app).await?;

    Ok(())
}

/// Accept Go-style `:8080` as shorthand for all interfaces
fn listen_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
