use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use tradesync_core::config::OdooConfig;
use tradesync_core::{
    EntityMapping, JobId, JobScope, JobState, LocalId, MappingFilter, MappingStatus, SyncType,
};

use crate::api::error::ApiError;
use crate::api::requests::{
    LogsQuery, MappingsQuery, TestOdooRequest, TriggerSyncRequest, UpsertMappingRequest,
};
use crate::api::responses::{
    HealthResponse, JobDto, LogDto, MappingDto, TestOdooResponse, TriggerResponse,
};
use crate::api::AppState;

pub const DEFAULT_LOG_LIMIT: usize = 50;
pub const MAX_LOG_LIMIT: usize = 1000;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn parse_sync_type(raw: &str) -> Result<SyncType, ApiError> {
    raw.parse::<SyncType>().map_err(|_| {
        ApiError::BadRequest(format!(
            "unknown sync type {raw:?} (expected Inventory, Product or Order)"
        ))
    })
}

fn parse_limit(raw: Option<&str>) -> Result<usize, ApiError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_LOG_LIMIT);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(ApiError::BadRequest(
            "limit must be a positive integer".to_string(),
        )),
        Ok(n) => Ok(n.min(MAX_LOG_LIMIT)),
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse::<u64>()
        .map(JobId)
        .map_err(|_| ApiError::BadRequest(format!("invalid job id {raw:?}")))
}

/// `Inventory` means everything; any type narrowed by an entity id means
/// that one entity.
pub fn scope_for(sync_type: SyncType, entity: Option<LocalId>) -> JobScope {
    match (entity, sync_type) {
        (Some(id), _) => JobScope::ByEntity(id),
        (None, SyncType::Inventory) => JobScope::Full,
        (None, t) => JobScope::ByType(t),
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.queue.stats();
    let queue_available = !state.queue.is_closed();
    let workers_active = state.workers.alive();
    let status = if queue_available && workers_active > 0 {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        queue_available,
        workers_active,
        worker_pool_size: state.worker_pool_size,
        last_successful_sync: state.run_log.last_success(),
        pending_tasks: stats.queued,
        running_tasks: stats.running,
    })
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogDto>>, ApiError> {
    let limit = parse_limit(query.limit.as_deref())?;
    let logs = state.run_log.list(limit).into_iter().map(LogDto::from).collect();
    Ok(Json(logs))
}

pub async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<MappingsQuery>,
) -> Result<Json<Vec<MappingDto>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse::<MappingStatus>()
                .map_err(|_| ApiError::BadRequest(format!("unknown mapping status {s:?}")))
        })
        .transpose()?;
    let entity_type = query
        .entity_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_sync_type)
        .transpose()?;

    let filter = MappingFilter {
        status,
        entity_type,
    };
    let rows = state
        .mappings
        .list(&filter)
        .into_iter()
        .map(MappingDto::from)
        .collect();
    Ok(Json(rows))
}

pub async fn upsert_mapping(
    State(state): State<AppState>,
    payload: Result<Json<UpsertMappingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MappingDto>), ApiError> {
    let req = body(payload)?;
    let entity_type = match req.entity_type.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_sync_type(raw)?,
        _ => SyncType::Product,
    };
    let local_id = req.odoo_product_id.to_string();
    let display_name = if req.odoo_name.trim().is_empty() {
        local_id.clone()
    } else {
        req.odoo_name.trim().to_string()
    };

    let stored = state.mappings.upsert(EntityMapping::new(
        local_id,
        req.ebay_sku.trim(),
        display_name,
        entity_type,
    ))?;
    tracing::info!(entity = %stored.local_id, sku = %stored.remote_sku, "mapping upserted");
    Ok((StatusCode::CREATED, Json(MappingDto::from(stored))))
}

pub async fn trigger_sync(
    State(state): State<AppState>,
    payload: Result<Json<TriggerSyncRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let req = body(payload)?;
    let sync_type = parse_sync_type(&req.sync_type)?;
    let entity = req
        .entity_id
        .map(|id| id.to_string())
        .filter(|id| !id.is_empty())
        .map(LocalId::from);
    if let Some(id) = &entity {
        state.mappings.get(id)?;
    }
    let scope = scope_for(sync_type, entity);

    let mappings = state.mappings.clone();
    let outcome = state
        .queue
        .submit(scope.clone(), move |id| mappings.type_of(id))?;

    let message = if outcome.deduped {
        format!(
            "{sync_type} sync already covered by active job {}",
            outcome.job_id
        )
    } else {
        format!("{sync_type} sync queued as job {} ({scope})", outcome.job_id)
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: if outcome.deduped {
                JobState::Deduped
            } else {
                JobState::Queued
            },
            job_id: outcome.job_id.0,
            deduped: outcome.deduped,
            message,
        }),
    ))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDto>, ApiError> {
    let job = state.queue.get(parse_job_id(&id)?)?;
    Ok(Json(JobDto::from(job)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDto>, ApiError> {
    let job = state.queue.cancel(parse_job_id(&id)?)?;
    Ok(Json(JobDto::from(job)))
}

pub async fn test_odoo(
    State(state): State<AppState>,
    payload: Result<Json<TestOdooRequest>, JsonRejection>,
) -> Result<Json<TestOdooResponse>, ApiError> {
    let req = body(payload)?;

    let missing: Vec<&str> = [
        ("url", &req.url),
        ("dbName", &req.db_name),
        ("username", &req.username),
        ("apiKey", &req.api_key),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Ok(Json(TestOdooResponse {
            success: false,
            message: format!("Missing required field(s): {}", missing.join(", ")),
        }));
    }
    let url = req.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Ok(Json(TestOdooResponse {
            success: false,
            message: "URL must start with http:// or https://".to_string(),
        }));
    }

    let config = OdooConfig {
        url: url.to_string(),
        db_name: req.db_name.trim().to_string(),
        username: req.username.trim().to_string(),
        api_key: req.api_key,
    };
    let erp = match (state.erp_connector)(config) {
        Ok(erp) => erp,
        Err(err) => {
            return Ok(Json(TestOdooResponse {
                success: false,
                message: err.to_string(),
            }))
        }
    };

    let response = match tokio::time::timeout(state.call_timeout, erp.check_connection()).await {
        Ok(Ok(info)) => TestOdooResponse {
            success: true,
            message: info.message,
        },
        Ok(Err(err)) => TestOdooResponse {
            success: false,
            message: format!("Connection failed: {err}"),
        },
        Err(_) => TestOdooResponse {
            success: false,
            message: format!(
                "Connection failed: no answer within {}ms",
                state.call_timeout.as_millis()
            ),
        },
    };
    tracing::info!(url, success = response.success, "odoo connection test");
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_mapping_from_trigger_type() {
        assert_eq!(scope_for(SyncType::Inventory, None), JobScope::Full);
        assert_eq!(
            scope_for(SyncType::Product, None),
            JobScope::ByType(SyncType::Product)
        );
        assert_eq!(
            scope_for(SyncType::Inventory, Some(LocalId::from("5"))),
            JobScope::ByEntity(LocalId::from("5"))
        );
    }

    #[test]
    fn limit_parsing() {
        assert_eq!(parse_limit(None).unwrap(), DEFAULT_LOG_LIMIT);
        assert_eq!(parse_limit(Some("7")).unwrap(), 7);
        assert_eq!(parse_limit(Some("999999")).unwrap(), MAX_LOG_LIMIT);
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("ten")).is_err());
    }
}
