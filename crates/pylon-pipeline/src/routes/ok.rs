use serde_json::json;

use crate::endpoint::Endpoint;

/// `GET /ok`, answering `{"ok": true}`.
#[must_use]
pub fn ok() -> Endpoint {
    Endpoint::get("/ok", |_ctx| Box::pin(async { Ok(json!({ "ok": true }).into()) })).with_metadata(
        json!({
            "openapi": {
                "description": "Check if the API is working",
            }
        }),
    )
}
