pub mod health;
pub mod identity;
pub mod oauth;
pub mod repo;
pub mod server;
pub mod sync;
pub mod well_known;

use axum::Extension;

use crate::auth::{JwtRefreshSecret, JwtSecret};
use crate::state::EngineState;

pub fn build_router(state: EngineState) -> axum::Router {
    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());
    let jwt_refresh_secret = JwtRefreshSecret(state.config.jwt_secret.clone());

    axum::Router::new()
        // Health
        .route("/xrpc/_health", axum::routing::get(health::health_check))
        // Server endpoints
        .route(
            "/xrpc/com.atproto.server.describeServer",
            axum::routing::get(server::describe_server),
        )
        .route(
            "/xrpc/com.atproto.server.createSession",
            axum::routing::post(server::create_session),
        )
        .route(
            "/xrpc/com.atproto.server.getSession",
            axum::routing::get(server::get_session),
        )
        .route(
            "/xrpc/com.atproto.server.refreshSession",
            axum::routing::post(server::refresh_session),
        )
        .route(
            "/xrpc/com.atproto.server.deleteSession",
            axum::routing::post(server::delete_session),
        )
        .route(
            "/xrpc/com.atproto.server.getServiceAuth",
            axum::routing::get(server::get_service_auth),
        )
        // Account lifecycle
        .route(
            "/xrpc/com.atproto.server.deleteAccount",
            axum::routing::post(server::delete_account),
        )
        .route(
            "/xrpc/com.atproto.server.deactivateAccount",
            axum::routing::post(server::deactivate_account),
        )
        .route(
            "/xrpc/com.atproto.server.activateAccount",
            axum::routing::post(server::activate_account),
        )
        .route(
            "/xrpc/com.atproto.server.checkAccountStatus",
            axum::routing::get(server::get_account_status),
        )
        // Repo endpoints
        .route(
            "/xrpc/com.atproto.repo.createRecord",
            axum::routing::post(repo::create_record),
        )
        .route(
            "/xrpc/com.atproto.repo.getRecord",
            axum::routing::get(repo::get_record),
        )
        .route(
            "/xrpc/com.atproto.repo.listRecords",
            axum::routing::get(repo::list_records),
        )
        .route(
            "/xrpc/com.atproto.repo.deleteRecord",
            axum::routing::post(repo::delete_record),
        )
        .route(
            "/xrpc/com.atproto.repo.putRecord",
            axum::routing::post(repo::put_record),
        )
        .route(
            "/xrpc/com.atproto.repo.describeRepo",
            axum::routing::get(repo::describe_repo),
        )
        .route(
            "/xrpc/com.atproto.repo.uploadBlob",
            axum::routing::post(repo::upload_blob),
        )
        .route(
            "/xrpc/com.atproto.repo.applyWrites",
            axum::routing::post(repo::apply_writes),
        )
        .route(
            "/xrpc/com.atproto.repo.importRepo",
            axum::routing::post(repo::import_repo),
        )
        // Sync endpoints
        .route(
            "/xrpc/com.atproto.sync.getRepo",
            axum::routing::get(sync::get_repo),
        )
        .route(
            "/xrpc/com.atproto.sync.getLatestCommit",
            axum::routing::get(sync::get_latest_commit),
        )
        .route(
            "/xrpc/com.atproto.sync.getBlocks",
            axum::routing::get(sync::get_blocks),
        )
        .route(
            "/xrpc/com.atproto.sync.getRepoStatus",
            axum::routing::get(sync::get_repo_status),
        )
        .route(
            "/xrpc/com.atproto.sync.getBlob",
            axum::routing::get(sync::get_blob),
        )
        .route(
            "/xrpc/com.atproto.sync.listBlobs",
            axum::routing::get(sync::list_blobs),
        )
        // Firehose WebSocket
        .route(
            "/xrpc/com.atproto.sync.subscribeRepos",
            axum::routing::get(crate::firehose::stream::subscribe_repos),
        )
        // Identity endpoints
        .route(
            "/xrpc/com.atproto.identity.resolveHandle",
            axum::routing::get(identity::resolve_handle),
        )
        .route(
            "/xrpc/com.atproto.identity.updateHandle",
            axum::routing::post(identity::update_handle),
        )
        // OAuth metadata endpoints
        .route(
            "/.well-known/oauth-authorization-server",
            axum::routing::get(oauth::authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            axum::routing::get(oauth::protected_resource_metadata),
        )
        // OAuth operational endpoints
        .route("/oauth/par", axum::routing::post(oauth::oauth_par))
        .route("/oauth/authorize", axum::routing::get(oauth::oauth_authorize))
        .route("/oauth/token", axum::routing::post(oauth::oauth_token))
        .route("/oauth/revoke", axum::routing::post(oauth::oauth_revoke))
        .route("/oauth/jwks", axum::routing::get(oauth::oauth_jwks))
        // Well-known
        .route(
            "/.well-known/atproto-did",
            axum::routing::get(well_known::atproto_did),
        )
        // Fallback: proxy unknown XRPC methods to the configured AppView.
        .fallback(crate::proxy::pipethrough::pipethrough_fallback)
        .layer(Extension(jwt_secret))
        .layer(Extension(jwt_refresh_secret))
        // CORS: allow any origin for XRPC (AT Protocol expects this).
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
                .expose_headers(tower_http::cors::Any),
        )
        // Request body size limit: 10 MiB default.
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            10 * 1024 * 1024,
        ))
        .with_state(state)
}
