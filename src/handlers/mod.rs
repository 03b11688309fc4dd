pub mod analyze;
pub mod assistant;
pub mod config;

pub use analyze::*;
pub use assistant::*;
pub use config::*;

use crate::health;
use actix_web::web;

/// Register every route on an app or scope.
///
/// The root `/health` alias lives here too so tests see the same surface as `main`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(get_config))
            .route("/analyze", web::post().to(analyze_stored))
            .route("/analyze/upload", web::post().to(analyze_upload))
            .route("/assistant", web::post().to(ask_assistant)),
    )
    .route("/health", web::get().to(health::health_check));
}
