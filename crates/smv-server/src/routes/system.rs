//! Health, hardware capabilities and tool availability.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use smv_av::{CapabilitySet, EncoderProfile, ToolInfo};

use crate::context::AppContext;

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub hw_accel: String,
    pub capabilities: CapabilitySet,
    /// Encoder ladder in the order candidates are tried.
    pub encoders: Vec<EncoderProfile>,
}

/// GET /api/capabilities
pub async fn capabilities(State(ctx): State<AppContext>) -> Json<CapabilitiesResponse> {
    let pipeline = ctx.pipeline();
    Json(CapabilitiesResponse {
        hw_accel: pipeline.encoding.hw_accel.clone(),
        capabilities: pipeline.capabilities.clone(),
        encoders: pipeline.encoders.clone(),
    })
}

/// GET /api/tools
pub async fn tools(State(ctx): State<AppContext>) -> Json<Vec<ToolInfo>> {
    let tools = ctx.pipeline().tools.clone();
    // Version detection spawns processes.
    let infos = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .unwrap_or_default();
    Json(infos)
}
