use axum::{http::Method, middleware::from_fn_with_state, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod export;
pub mod health;
pub mod mailer;
pub mod members;
pub mod menu;
pub mod middleware;
pub mod orders;
pub mod state;
pub mod uploads;
pub mod webhooks;

pub use state::AppState;

use middleware::{admin_auth_middleware, member_auth_middleware};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let member_routes = Router::new()
        .merge(orders::member_routes())
        .merge(members::member_routes())
        .route_layer(from_fn_with_state(state.clone(), member_auth_middleware));

    let admin_routes = Router::new()
        .merge(menu::admin_routes())
        .merge(orders::admin_routes())
        .merge(members::admin_routes())
        .merge(export::routes())
        .merge(uploads::routes(state.uploads.max_bytes))
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    let api = Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(menu::public_routes())
        .merge(webhooks::routes())
        .merge(member_routes)
        .merge(admin_routes);

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.uploads.dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
