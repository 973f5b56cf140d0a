use serde_json::Value;

pub const CODE_INTERNAL: &str = "VIEW-500";
pub const CODE_BAD_REQUEST: &str = "VIEW-400";
pub const CODE_NOT_FOUND: &str = "VIEW-404";

pub const CODE_PROXY_FORBIDDEN: &str = "PROXY-403";
pub const CODE_PROXY_BAD_GATEWAY: &str = "PROXY-502";

pub fn internal_error_json(details: &str) -> Value {
    error_json(CODE_INTERNAL, "Internal error", Some(details))
}

pub fn bad_request_json(details: &str) -> Value {
    error_json(CODE_BAD_REQUEST, "Invalid request", Some(details))
}

pub fn not_found_json(details: &str) -> Value {
    error_json(CODE_NOT_FOUND, "Not found", Some(details))
}

pub fn proxy_forbidden_json(details: &str) -> Value {
    error_json(CODE_PROXY_FORBIDDEN, "Host not allowed", Some(details))
}

pub fn proxy_bad_gateway_json(details: &str) -> Value {
    error_json(CODE_PROXY_BAD_GATEWAY, "Upstream unavailable", Some(details))
}

pub fn error_json(code: &str, safe_message: &str, details: Option<&str>) -> Value {
    serde_json::json!({
        "status": "error",
        "code": code,
        "message": public_message(safe_message, details)
    })
}

/// Details are only exposed in debug builds.
pub fn public_message(safe_message: &str, details: Option<&str>) -> String {
    match details {
        Some(details) if cfg!(debug_assertions) => format!("{}: {}", safe_message, details),
        _ => safe_message.to_string(),
    }
}
