// Server module - HTTP server setup and routing
use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// Create the Axum application router with all routes and middleware
pub fn create_app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/schemas",
            get(handlers::list_schemas).post(handlers::define_schema),
        )
        .route(
            "/api/schemas/{name}",
            get(handlers::get_schema)
                .put(handlers::redefine_schema)
                .delete(handlers::remove_schema),
        )
        .route("/api/schemas/{name}/rename", post(handlers::rename_schema))
        .route(
            "/api/entities/{entity}",
            get(handlers::read_entities)
                .post(handlers::create_entity)
                .put(handlers::update_entity)
                .delete(handlers::delete_entity),
        )
        .layer(cors)
        .with_state(state)
}

/// Run the server on the specified address
pub async fn run_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    info!("Server listening on {}", addr);
    info!("- Schemas:  http://{}/api/schemas", addr);
    info!("- Entities: http://{}/api/entities/{{entity}}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
