//! API route handlers for the gateway.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{Value, json};
use std::sync::Arc;

use leadclaw_core::error::LeadClawError;
use leadclaw_core::types::Step;
use leadclaw_dispatch::BatchSource;
use leadclaw_lifecycle::{FormSubmission, LeadRef};

use super::server::AppState;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Map the error taxonomy onto HTTP statuses, surfacing the message.
fn api_error(e: LeadClawError) -> (StatusCode, Json<Value>) {
    let status = match e {
        LeadClawError::Validation(_) => StatusCode::BAD_REQUEST,
        LeadClawError::NotFound(_) => StatusCode::NOT_FOUND,
        LeadClawError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("❌ request failed: {e}");
    }
    (status, Json(json!({ "error": e.to_string() })))
}

fn bad_request(msg: &str) -> (StatusCode, Json<Value>) {
    api_error(LeadClawError::Validation(msg.into()))
}

fn parse_phones(body: &Value) -> Result<Vec<String>, (StatusCode, Json<Value>)> {
    let phones: Vec<String> = body["phones"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    if phones.is_empty() {
        return Err(bad_request("phones (array) is required"));
    }
    Ok(phones)
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "leadclaw-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "active_runs": state.engine.active_runs(),
    }))
}

/// Fan an inline step list out over a recipient list.
/// Returns scheduling outcomes immediately; delivery happens on the timers.
pub async fn send_bulk_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let phones = parse_phones(&body)?;
    let messages = body
        .get("messages")
        .cloned()
        .ok_or_else(|| bad_request("messages (array) is required"))?;
    let steps: Vec<Step> = serde_json::from_value(messages)
        .map_err(|e| bad_request(&format!("malformed messages: {e}")))?;

    let batch = state
        .engine
        .run_batch(&phones, BatchSource::Inline(steps))
        .map_err(api_error)?;
    Ok(Json(json!({
        "total": batch.total,
        "success": batch.success,
        "failed": batch.failed,
        "results": batch.results,
    })))
}

/// Fan a named sequence out over a recipient list. 404 if unknown.
pub async fn send_bulk_sequence(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let phones = parse_phones(&body)?;
    let name = body["sequenceId"]
        .as_str()
        .or_else(|| body["sequenceName"].as_str())
        .ok_or_else(|| bad_request("sequenceId is required"))?;

    let batch = state
        .engine
        .run_batch(&phones, BatchSource::Named(name.to_string()))
        .map_err(api_error)?;
    Ok(Json(json!({
        "total": batch.total,
        "success": batch.success,
        "failed": batch.failed,
        "results": batch.results,
    })))
}

/// Intake form completed.
pub async fn after_form(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let submission: FormSubmission = serde_json::from_value(body)
        .map_err(|e| bad_request(&format!("malformed form submission: {e}")))?;
    let outcome = state
        .lifecycle
        .form_submitted(submission)
        .map_err(api_error)?;
    Ok(Json(json!({
        "ok": true,
        "leadId": outcome.lead_id,
        "slug": outcome.slug,
    })))
}

/// Sample site link sent — arms the delayed nudge sequence.
pub async fn sample_sent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let lead_ref: LeadRef = serde_json::from_value(body)
        .map_err(|e| bad_request(&format!("malformed request: {e}")))?;
    let outcome = state.lifecycle.sample_sent(&lead_ref).map_err(api_error)?;
    Ok(Json(json!({
        "ok": true,
        "leadId": outcome.lead_id,
        "scheduledAt": outcome.scheduled_at.map(|t| t.to_rfc3339()),
    })))
}

/// Tracking link opened — idempotent.
pub async fn link_open(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let lead_ref: LeadRef = serde_json::from_value(body)
        .map_err(|e| bad_request(&format!("malformed request: {e}")))?;
    let outcome = state.lifecycle.link_opened(&lead_ref).map_err(api_error)?;
    if outcome.already {
        Ok(Json(json!({ "ok": true, "already": true })))
    } else {
        Ok(Json(json!({ "ok": true })))
    }
}

/// Register a new lead. 409 when the phone is already known.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let phone = body["phone"]
        .as_str()
        .ok_or_else(|| bad_request("phone is required"))?;
    let name = body["name"].as_str().unwrap_or("");
    let lead = state
        .lifecycle
        .register_lead(phone, name)
        .map_err(api_error)?;
    Ok(Json(json!({ "ok": true, "leadId": lead.id, "phone": lead.phone })))
}

/// List sequence names with step counts.
pub async fn list_sequences(State(state): State<Arc<AppState>>) -> ApiResult {
    let sequences = state.store.list_sequences().map_err(api_error)?;
    let items: Vec<Value> = sequences
        .into_iter()
        .map(|(name, steps)| json!({ "name": name, "steps": steps }))
        .collect();
    Ok(Json(json!({ "sequences": items })))
}

/// Create or replace a named sequence definition.
pub async fn put_sequence(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    let steps: Vec<Step> = serde_json::from_value(body)
        .map_err(|e| bad_request(&format!("malformed steps: {e}")))?;
    if steps.is_empty() {
        return Err(bad_request("steps (array) must not be empty"));
    }
    state.store.put_sequence(&name, &steps).map_err(api_error)?;
    tracing::info!("📚 sequence '{}' saved ({} steps)", name, steps.len());
    Ok(Json(json!({ "ok": true, "name": name, "steps": steps.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadclaw_core::config::LeadClawConfig;
    use leadclaw_core::error::Result;
    use leadclaw_core::traits::Transport;
    use leadclaw_dispatch::DispatchEngine;
    use leadclaw_lifecycle::LifecycleReconciler;
    use leadclaw_store::Store;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn name(&self) -> &str {
            "null"
        }
        async fn send_text(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn send_image(&self, _: &str, _: &str, _: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn send_voice_note(&self, _: &str, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn send_video(&self, _: &str, _: &str, _: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn send_video_note(&self, _: &str, _: &str, _: Option<u32>) -> Result<()> {
            Ok(())
        }
    }

    fn test_state() -> Arc<AppState> {
        let config = LeadClawConfig::default();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = DispatchEngine::new(store.clone(), Arc::new(NullTransport), &config.dispatch);
        let lifecycle = Arc::new(LifecycleReconciler::new(
            store.clone(),
            engine.clone(),
            config.lifecycle.clone(),
        ));
        Arc::new(AppState {
            config,
            store,
            engine,
            lifecycle,
            start_time: std::time::Instant::now(),
        })
    }

    #[tokio::test]
    async fn test_bulk_message_requires_fields() {
        let state = test_state();

        let (status, _) = send_bulk_message(State(state.clone()), Json(json!({})))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_bulk_message(
            State(state),
            Json(json!({ "phones": ["5215511111111"] })),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bulk_message_reports_scheduling_success() {
        let state = test_state();
        let body = json!({
            "phones": ["5215511111111", "5215522222222"],
            "messages": [{ "type": "texto", "contenido": "hola", "delay": 0 }]
        });
        let Json(resp) = send_bulk_message(State(state), Json(body)).await.unwrap();
        assert_eq!(resp["total"], 2);
        assert_eq!(resp["success"], 2);
        assert_eq!(resp["failed"], 0);
    }

    #[tokio::test]
    async fn test_bulk_sequence_unknown_is_404() {
        let state = test_state();
        let body = json!({ "phones": ["5215511111111"], "sequenceId": "NoExiste" });
        let (status, err) = send_bulk_sequence(State(state), Json(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(err.0["error"].as_str().unwrap().contains("NoExiste"));
    }

    #[tokio::test]
    async fn test_link_open_idempotent_response_shape() {
        let state = test_state();
        state
            .store
            .put_sequence("LinkAbierto", &[Step::text("¿qué te pareció?")])
            .unwrap();
        state.lifecycle.register_lead("5215511111111", "Ana").unwrap();

        let body = json!({ "leadPhone": "5215511111111" });
        let Json(first) = link_open(State(state.clone()), Json(body.clone()))
            .await
            .unwrap();
        assert_eq!(first, json!({ "ok": true }));

        let Json(second) = link_open(State(state), Json(body)).await.unwrap();
        assert_eq!(second, json!({ "ok": true, "already": true }));
    }

    #[tokio::test]
    async fn test_after_form_returns_slug() {
        let state = test_state();
        let body = json!({
            "leadPhone": "5215511111111",
            "nombre": "Ana López",
            "slug": "tacos-dona-lupe",
            "fields": { "giro": "restaurante" }
        });
        let Json(resp) = after_form(State(state), Json(body)).await.unwrap();
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["leadId"], "5215511111111");
        assert_eq!(resp["slug"], "tacos-dona-lupe");
    }

    #[tokio::test]
    async fn test_create_lead_duplicate_is_409() {
        let state = test_state();
        let body = json!({ "phone": "5215511111111", "name": "Ana" });
        let Json(created) = create_lead(State(state.clone()), Json(body.clone()))
            .await
            .unwrap();
        assert_eq!(created["ok"], true);
        assert_eq!(created["leadId"], "5215511111111");

        let (status, _) = create_lead(State(state), Json(body)).await.unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_sequence_admin_roundtrip() {
        let state = test_state();
        let steps = json!([
            { "type": "texto", "contenido": "hola", "delay": 0 },
            { "type": "imagen", "contenido": "https://cdn.example/a.png", "delay": 5 }
        ]);
        let Json(saved) = put_sequence(
            State(state.clone()),
            Path("WebEnviada".to_string()),
            Json(steps),
        )
        .await
        .unwrap();
        assert_eq!(saved["steps"], 2);

        let Json(listed) = list_sequences(State(state)).await.unwrap();
        assert_eq!(listed["sequences"][0]["name"], "WebEnviada");
        assert_eq!(listed["sequences"][0]["steps"], 2);
    }
}
