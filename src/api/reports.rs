use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::middleware::auth_gate::Claims;
use crate::reports::{
    parse_date_or, DailyMovementReport, DateRange, Granularity, ParkedSnapshot, PeakHoursReport,
    PeakWindow, VehicleReport, DEFAULT_TRAILING_DAYS,
};
use crate::AppState;

fn default_granularity() -> Granularity {
    Granularity::Hour
}

#[derive(Deserialize)]
pub struct DailyMovementParams {
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct PeakHoursParams {
    #[serde(default = "default_granularity")]
    pub group_by: Granularity,
    pub days: Option<u32>,
    pub all_time: Option<bool>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct VehicleReportParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /reports/daily-movement — single date (default today) or an
/// explicit range.
pub async fn daily_movement(
    State(state): State<Arc<AppState>>,
    Claims(claims): Claims,
    Query(params): Query<DailyMovementParams>,
) -> Result<Json<DailyMovementReport>, AppError> {
    let today = state.reports.today();
    let range = if params.start_date.is_some() || params.end_date.is_some() {
        DateRange {
            start: parse_date_or(params.start_date.as_deref(), today),
            end: parse_date_or(params.end_date.as_deref(), today),
        }
    } else {
        DateRange::single(parse_date_or(params.date.as_deref(), today))
    };
    let report = state.reports.daily_movement(claims.tenant_id, range).await?;
    Ok(Json(report))
}

/// GET /reports/peak-hours — movement grouped by hour/day/month/year.
/// Window precedence: all_time, then an explicit range, then trailing
/// days (default 7).
pub async fn peak_hours(
    State(state): State<Arc<AppState>>,
    Claims(claims): Claims,
    Query(params): Query<PeakHoursParams>,
) -> Result<Json<PeakHoursReport>, AppError> {
    let window = if params.all_time.unwrap_or(false) {
        PeakWindow::AllTime
    } else if params.start_date.is_some() || params.end_date.is_some() {
        let today = state.reports.today();
        PeakWindow::Range(DateRange {
            start: parse_date_or(params.start_date.as_deref(), today),
            end: parse_date_or(params.end_date.as_deref(), today),
        })
    } else {
        PeakWindow::TrailingDays(params.days.unwrap_or(DEFAULT_TRAILING_DAYS))
    };
    let report = state
        .reports
        .peak_hours(claims.tenant_id, params.group_by, window)
        .await?;
    Ok(Json(report))
}

/// GET /reports/vehicles — per-entry durations plus range aggregates.
pub async fn vehicles(
    State(state): State<Arc<AppState>>,
    Claims(claims): Claims,
    Query(params): Query<VehicleReportParams>,
) -> Result<Json<VehicleReport>, AppError> {
    let today = state.reports.today();
    let range = DateRange {
        start: parse_date_or(params.start_date.as_deref(), today),
        end: parse_date_or(params.end_date.as_deref(), today),
    };
    let report = state.reports.vehicle_report(claims.tenant_id, range).await?;
    Ok(Json(report))
}

/// GET /reports/parked-vehicles — live snapshot with elapsed times.
pub async fn parked_vehicles(
    State(state): State<Arc<AppState>>,
    Claims(claims): Claims,
) -> Result<Json<ParkedSnapshot>, AppError> {
    let report = state.reports.parked_snapshot(claims.tenant_id).await?;
    Ok(Json(report))
}
