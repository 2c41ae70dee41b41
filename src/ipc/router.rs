use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use tracing::{debug, warn};

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLER_FAMILIES: [TryHandle; 6] = [
    handlers::core::try_handle,
    handlers::users::try_handle,
    handlers::catalog::try_handle,
    handlers::assessments::try_handle,
    handlers::marks::try_handle,
    handlers::grades::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    debug!(id = %req.id, method = %req.method, "request");

    let resp = HANDLER_FAMILIES
        .iter()
        .find_map(|try_handle| try_handle(state, &req))
        .unwrap_or_else(|| {
            err(
                &req.id,
                "not_implemented",
                format!("unknown method: {}", req.method),
                None,
            )
        });

    if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        warn!(id = %req.id, method = %req.method, code, "request failed");
    }
    resp
}
