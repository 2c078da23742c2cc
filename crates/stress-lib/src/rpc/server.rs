//! HTTP handlers serving the agent RPC contract

use super::{ActiveState, TargetValue, CPU_TARGET_PATH, MEMORY_TARGET_PATH, START_PATH, STOP_PATH};
use crate::load::LoadController;
use axum::{extract::State, routing::post, Json, Router};

async fn set_memory_target(
    State(controller): State<LoadController>,
    Json(body): Json<TargetValue>,
) -> Json<TargetValue> {
    Json(TargetValue {
        value: controller.set_memory_target(body.value),
    })
}

async fn set_cpu_target(
    State(controller): State<LoadController>,
    Json(body): Json<TargetValue>,
) -> Json<TargetValue> {
    Json(TargetValue {
        value: controller.set_cpu_target(body.value),
    })
}

async fn start(State(controller): State<LoadController>) -> Json<ActiveState> {
    Json(ActiveState {
        active: controller.start(),
    })
}

async fn stop(State(controller): State<LoadController>) -> Json<ActiveState> {
    Json(ActiveState {
        active: controller.stop(),
    })
}

/// Router for the four RPC calls, to be merged into the agent's API
pub fn router(controller: LoadController) -> Router {
    Router::new()
        .route(MEMORY_TARGET_PATH, post(set_memory_target))
        .route(CPU_TARGET_PATH, post(set_cpu_target))
        .route(START_PATH, post(start))
        .route(STOP_PATH, post(stop))
        .with_state(controller)
}
