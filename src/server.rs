//! HTTP surface: `/{call}.{format}` endpoints and `/health`.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};

use crate::converter::CancelToken;
use crate::error::SiriError;
use crate::request::{CallKind, Format};
use crate::state::AppState;
use crate::validate::{Params, validate};

/// Upper bound on one build; the build is cancelled when it passes.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout(pub Duration);

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/{endpoint}", web::get().to(siri_call));
}

/// Serves `state` on `port` until the process is stopped.
pub async fn serve(state: Arc<AppState>, port: u16, request_timeout: Duration) -> std::io::Result<()> {
    let state = web::Data::from(state);
    let timeout = web::Data::new(RequestTimeout(request_timeout));
    info!(port, "Listening");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(timeout.clone())
            .configure(config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

/// Splits `stop-monitoring.json` into its call and format.
pub fn parse_endpoint(endpoint: &str) -> Option<(CallKind, Format)> {
    let (call, format) = endpoint.rsplit_once('.')?;
    Some((CallKind::parse(call)?, Format::parse(format)?))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(&state.current().stats)
}

#[tracing::instrument(skip_all, fields(endpoint = %endpoint))]
async fn siri_call(
    endpoint: web::Path<String>,
    req: HttpRequest,
    state: web::Data<AppState>,
    timeout: web::Data<RequestTimeout>,
) -> HttpResponse {
    let Some((kind, format)) = parse_endpoint(&endpoint) else {
        return HttpResponse::NotFound().finish();
    };
    let now = Utc::now().timestamp();

    let pairs = match web::Query::<Vec<(String, String)>>::from_query(req.query_string()) {
        Ok(pairs) => pairs.into_inner(),
        Err(e) => {
            warn!(error = %e, "Malformed query string");
            return error_response(&state, StatusCode::BAD_REQUEST, &e.to_string(), format, now);
        }
    };
    let request = match validate(kind, format, &Params::new(pairs), state.static_index()) {
        Ok(request) => request,
        Err(e) => {
            let e = SiriError::from(e);
            warn!(error = %e, "Rejected request");
            return siri_error_response(&state, &e, format, now);
        }
    };

    let cancel = CancelToken::new();
    let worker = {
        let state = state.clone().into_inner();
        let cancel = cancel.clone();
        web::block(move || state.respond(&request, now, &cancel))
    };

    match tokio::time::timeout(timeout.0, worker).await {
        Ok(Ok(Ok(bytes))) => HttpResponse::Ok()
            .content_type(format.content_type())
            .body(bytes),
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Build failed");
            siri_error_response(&state, &e, format, now)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Build worker failed");
            error_response(&state, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), format, now)
        }
        Err(_) => {
            cancel.cancel();
            warn!(timeout_ms = timeout.0.as_millis() as u64, "Build timed out");
            error_response(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                "request timed out",
                format,
                now,
            )
        }
    }
}

fn siri_error_response(state: &AppState, e: &SiriError, format: Format, now: i64) -> HttpResponse {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(state, status, &e.to_string(), format, now)
}

fn error_response(state: &AppState, status: StatusCode, message: &str, format: Format, now: i64) -> HttpResponse {
    let body: Bytes = state.error_body(message, format, now);
    HttpResponse::build(status)
        .content_type(format.content_type())
        .body(body)
}
