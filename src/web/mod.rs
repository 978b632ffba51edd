//! The HTTP surface: registration, check-in, attendance marking, record listing and the report
//! download.

use std::sync::Arc;

use anyhow::Context as _;
use axum::{Router, routing::get};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

pub mod error;
pub mod routes;
pub mod state;
pub mod views;

use routes::{
    add_student_form_handler, add_student_handler, check_in_handler, error_handler,
    generate_report_handler, index_handler, mark_attendance_form_handler, mark_attendance_handler,
    not_found_handler, student_details_handler, success_handler, view_records_handler,
};
use state::State;

use crate::settings::Settings;

pub fn router(state: Arc<State>) -> Router {
    let static_files = ServeDir::new(&state.settings.paths.static_dir);

    Router::new()
        .route("/", get(index_handler))
        .route(
            "/add_student",
            get(add_student_form_handler).post(add_student_handler),
        )
        .route("/student_details/{student_id}", get(student_details_handler))
        .route(
            "/mark_attendance",
            get(mark_attendance_form_handler).post(mark_attendance_handler),
        )
        .route(
            "/check_in/{roll_number}",
            get(check_in_handler).post(check_in_handler),
        )
        .route("/success", get(success_handler))
        .route("/error", get(error_handler))
        .route("/view_records", get(view_records_handler))
        .route("/generate_report", get(generate_report_handler))
        .nest_service("/static", static_files)
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    info!("Initializing state...");
    let state = State::new(settings).context("failed to initialize application state")?;

    info!("Starting server...");
    let app = router(state.clone());

    let address = state.settings.server.bind.clone();
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind to {address}"))?;
    info!(
        "Server running on {address}, check-in codes point at {}",
        state.settings.server.base_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
