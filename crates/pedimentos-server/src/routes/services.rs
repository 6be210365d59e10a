use axum::extract::{Path, Query, State};
use axum::Json;
use pedimentos_core::{
    CompletionMetadata, OrchestrationPlan, PedimentoKey, PrimaryRequest, ServiceKind,
    ServiceRegistry, ServiceState, StatusAggregator, StatusReport,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::tracker::Launch;

// ---------------------------------------------------------------------------
// POST /services/pedimento_completo
// ---------------------------------------------------------------------------

/// Run the primary pedimento-completo service, then schedule the automatic
/// follow-up services in the background. Returns as soon as the primary
/// service is done.
pub async fn pedimento_completo(
    State(app): State<AppState>,
    Json(body): Json<PrimaryRequest>,
) -> Result<Json<Value>, AppError> {
    let request = body.validated()?;
    let key = request.key();
    info!(pedimento = %key, "pedimento completo requested");

    let registry = app.registry.as_ref();
    let record = registry
        .find_or_create(
            &key,
            ServiceKind::PedimentoCompleto,
            request.tipo_procesamiento,
        )
        .await?;
    let record = registry.set_state(&record, ServiceState::InProgress).await?;

    let result = match app.processor.process(&request).await {
        Ok(result) => result,
        Err(e) => {
            error!(pedimento = %key, error = %e, "pedimento completo failed");
            if let Err(mark) = registry.set_state(&record, ServiceState::Error).await {
                warn!(pedimento = %key, error = %mark, "could not mark service as ERROR");
            }
            return Err(e.into());
        }
    };
    let record = registry.set_state(&record, ServiceState::Finished).await?;

    let meta = CompletionMetadata::from_result(key.clone(), &result);
    let plan = OrchestrationPlan::derive(&meta);
    info!(
        pedimento = %key,
        partidas = meta.item_count,
        remesas = meta.remittances,
        "scheduling automatic services"
    );
    let launch = app.tracker.launch(app.orchestrator.clone(), plan.clone()).await;

    let mut body = match result {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    body.insert("servicio".to_string(), json!(record.id));
    body.insert(
        "automatic_services".to_string(),
        automatic_services(&key, &plan, &launch),
    );
    Ok(Json(Value::Object(body)))
}

fn automatic_services(key: &PedimentoKey, plan: &OrchestrationPlan, launch: &Launch) -> Value {
    match launch {
        Launch::Scheduled { run_id } => json!({
            "scheduled": true,
            "run_id": run_id,
            "partidas_scheduled": plan.is_applicable(ServiceKind::Partidas),
            "remesas_scheduled": plan.is_applicable(ServiceKind::Remesas),
            "acuses_scheduled": plan.is_applicable(ServiceKind::Acuse),
            "message": "Automatic services scheduled in the background",
        }),
        Launch::AlreadyRunning { run_id } => json!({
            "scheduled": false,
            "run_id": run_id,
            "partidas_scheduled": false,
            "remesas_scheduled": false,
            "acuses_scheduled": false,
            "message": format!("Automatic services already running for {key} (run {run_id})"),
        }),
    }
}

// ---------------------------------------------------------------------------
// GET /services/status/{pedimento_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub organizacion: Option<String>,
}

/// Progress of the primary service and its automatic follow-ups.
pub async fn status(
    State(app): State<AppState>,
    Path(pedimento_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusReport>, AppError> {
    let organization = query
        .organizacion
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("organizacion query parameter is required"))?;
    let pedimento_id = pedimento_id.trim();
    if pedimento_id.is_empty() {
        return Err(AppError::bad_request("pedimento_id must not be empty"));
    }

    let key = PedimentoKey::new(organization, pedimento_id);
    let plan = app.tracker.plan_for(&key).await;
    let report = StatusAggregator::new(app.registry.clone())
        .snapshot(&key, plan.as_ref())
        .await?;
    Ok(Json(report))
}
