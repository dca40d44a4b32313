use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use ridelink::{
    handlers::{directory_handler, session_handler},
    state::{AppConfig, AppState},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config).await.expect("failed to build app state");

    let app = Router::new()
        .route(
            "/trips",
            post(directory_handler::create_trip).get(directory_handler::all_trips),
        )
        .route("/trips/active", get(directory_handler::active_trips))
        .route("/trips/:id", get(directory_handler::get_trip))
        .route("/trips/:id/candidate", get(directory_handler::trip_candidate))
        .route("/riders/:id/trips", get(directory_handler::trips_for_rider))
        .route("/riders/:id/trips/active", get(directory_handler::active_trip_for_rider))
        .route(
            "/drivers",
            post(directory_handler::create_driver).get(directory_handler::list_drivers),
        )
        .route("/drivers/locations", get(directory_handler::driver_locations))
        .route("/drivers/by-mobile/:mobile", get(directory_handler::get_driver_by_mobile))
        .route(
            "/drivers/:id",
            get(directory_handler::get_driver)
                .put(directory_handler::update_driver)
                .delete(directory_handler::delete_driver),
        )
        .route("/drivers/:id/trips", get(directory_handler::trips_for_driver))
        .route("/drivers/:id/trips/active", get(directory_handler::active_trip_for_driver))
        .route("/drivers/:id/locations", get(directory_handler::driver_history))
        .route("/feedback", post(directory_handler::provide_feedback))
        .route("/ws/driver/trip", get(session_handler::driver_trip_ws))
        .route("/ws/rider/trip", get(session_handler::rider_trip_ws))
        .route("/ws/driver/locations", get(session_handler::driver_locations_ws))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("ridelink listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", err);
        return;
    }
    tracing::info!("shutdown signal received, draining sessions");
}
