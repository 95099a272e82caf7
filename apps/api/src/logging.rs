use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_TYPE, Method},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharebox_api=info,tower_http=warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

pub async fn request_logger(mut request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let payload = extract_json_payload(&mut request).await;

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    let duration_ms = duration.as_secs_f64() * 1000.0;
    let payload_text = payload.unwrap_or_else(|| "{}".to_string());
    let log_line = format!(
        "{} {} {} {:05.2}ms {}",
        method,
        path,
        status.as_u16(),
        duration_ms,
        payload_text
    );

    match status.as_u16() {
        200..=399 => info!("{}", log_line),
        400..=499 => warn!("{}", log_line),
        _ => error!("{}", log_line),
    }

    response
}

fn is_json(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Compact JSON bodies for the log line. Chunk uploads are raw bytes and
/// are never buffered here.
async fn extract_json_payload(request: &mut Request<Body>) -> Option<String> {
    let method = request.method();
    if (method != Method::POST && method != Method::PATCH) || !is_json(request) {
        return None;
    }

    let body = std::mem::replace(request.body_mut(), Body::empty());
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(_) => return None,
    };

    let compact = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(mut value) => {
            redact_secrets(&mut value);
            value.to_string()
        }
        Err(_) => String::from_utf8_lossy(&bytes).trim().to_string(),
    };

    *request.body_mut() = Body::from(bytes);

    Some(compact)
}

fn redact_secrets(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if key == "password" {
                    *inner = serde_json::Value::String("***".to_string());
                } else {
                    redact_secrets(inner);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}

pub fn log_panic(info: &std::panic::PanicHookInfo) {
    let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    };

    let location = if let Some(loc) = info.location() {
        format!("{}:{}:{}", loc.file(), loc.line(), loc.column())
    } else {
        "unknown location".to_string()
    };

    error!("PANIC at {}: {}", location, payload);
}

pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log_panic(info);
        default_hook(info);
    }));
}
