//! JSON-RPC 2.0 endpoint.
//!
//! `POST /` accepts `message/send`, `message/cancel`, `workflow/execute`, and
//! `workflow/parallel`. JSON-RPC-level failures are carried in the `error`
//! object while HTTP stays 200.

use crate::SharedState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use switchyard_core::A2aMessage;
use switchyard_router::RouteRequest;
use switchyard_workflow::{ParallelTask, StepSpec};
use tracing::debug;

pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn result(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: serde_json::Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

pub async fn rpc_handler(
    State(state): State<SharedState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    debug!(method = %request.method, "JSON-RPC request");

    if request.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    let response = match request.method.as_str() {
        "message/send" => handle_message_send(&state, &request.params, request.id).await,
        "message/cancel" => {
            let message = state.router.cancel();
            JsonRpcResponse::result(request.id, serde_json::json!(message))
        }
        "workflow/execute" => handle_workflow_execute(&state, &request.params, request.id).await,
        "workflow/parallel" => handle_workflow_parallel(&state, &request.params, request.id).await,
        other => JsonRpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    };

    Json(response)
}

async fn handle_message_send(
    state: &SharedState,
    params: &serde_json::Value,
    id: serde_json::Value,
) -> JsonRpcResponse {
    let Some(message_value) = params.get("message") else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "params.message is required");
    };
    let message: A2aMessage = match serde_json::from_value(message_value.clone()) {
        Ok(message) => message,
        Err(e) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid message: {e}"));
        }
    };

    let task_id = params
        .get("taskId")
        .or_else(|| params.get("task_id"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let mut request = RouteRequest::new(message);
    if let Some(task_id) = task_id {
        request = request.with_task_id(task_id);
    }

    let reply = state.router.execute(&request).await;
    JsonRpcResponse::result(id, serde_json::json!(reply))
}

async fn handle_workflow_execute(
    state: &SharedState,
    params: &serde_json::Value,
    id: serde_json::Value,
) -> JsonRpcResponse {
    let steps: Vec<StepSpec> = match serde_json::from_value(
        params.get("steps").cloned().unwrap_or_default(),
    ) {
        Ok(steps) => steps,
        Err(e) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid steps: {e}"));
        }
    };
    if steps.is_empty() {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "params.steps must be non-empty");
    }

    let workflow_id = params
        .get("workflowId")
        .and_then(|v| v.as_str())
        .map(String::from);

    let result = state.orchestrator.execute_workflow(steps, workflow_id).await;
    JsonRpcResponse::result(id, serde_json::json!(result))
}

async fn handle_workflow_parallel(
    state: &SharedState,
    params: &serde_json::Value,
    id: serde_json::Value,
) -> JsonRpcResponse {
    let tasks: Vec<ParallelTask> = match serde_json::from_value(
        params.get("tasks").cloned().unwrap_or_default(),
    ) {
        Ok(tasks) => tasks,
        Err(e) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid tasks: {e}"));
        }
    };
    if tasks.is_empty() {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "params.tasks must be non-empty");
    }

    let workflow_id = params
        .get("workflowId")
        .and_then(|v| v.as_str())
        .map(String::from);

    let result = state.orchestrator.execute_parallel(tasks, workflow_id).await;
    JsonRpcResponse::result(id, serde_json::json!(result))
}
