// src/routes.rs
use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::{require_manager, Role, User};
use crate::notifications::Notification;
use crate::timesheet::{
    populate_week_days, week_boundaries_from_input, DayRecord, DayStatus, ManagerReview,
    RawField, ReviewStatus, WeekRecord,
};
use crate::{AppError, AppState};

pub fn api_router() -> Router<AppState> {
    let auth_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login));

    let timesheet_routes = Router::new()
        .route("/draft", post(save_draft))
        .route("/validate", post(submit_and_validate))
        .route("/dates", get(list_dates))
        .route("/drafts", get(list_draft_entries))
        .route("/date/{date}", delete(delete_draft_day));

    let manager_routes = Router::new()
        .route("/timesheets", get(list_timesheets))
        .route("/timesheets/{id}/approve", put(approve_timesheet))
        .route("/timesheets/{id}/reject", put(reject_timesheet))
        .route("/timesheets/{id}/export", get(export_timesheet))
        .route("/audit/{user_id}", get(audit_entries));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/timesheet", timesheet_routes)
        .nest("/api/manager", manager_routes)
}

// --- Auth ---

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .auth
        .register(&payload.email, &payload.password, &payload.full_name, Role::Employee)?;
    Ok(Json(json!({
        "message": "User registered successfully",
        "user_id": user.id,
    })))
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<Value>, AppError> {
    let (token, user) = state.auth.login(&payload.email, &payload.password)?;
    info!("User {} logged in", user.email);
    Ok(Json(json!({
        "token": token,
        "token_type": "Bearer",
        "role": user.role,
    })))
}

// --- Timesheet submission ---

#[derive(Deserialize)]
pub struct DayEntryPayload {
    pub date: String,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub lunch_timeout: Option<RawField>,
    pub total_hours: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct DraftPayload {
    pub days: Vec<DayEntryPayload>,
}

#[derive(Deserialize)]
pub struct SubmitPayload {
    pub days: Vec<DayEntryPayload>,
    #[serde(default)]
    pub image_paths: Vec<String>,
}

fn parse_day_entries(
    days: &[DayEntryPayload],
) -> Result<BTreeMap<NaiveDate, DayRecord>, AppError> {
    if days.is_empty() {
        return Err(AppError::BadRequest("No daily entries provided".to_string()));
    }
    let mut provided = BTreeMap::new();
    for entry in days {
        let date = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!("Invalid date format: {}", entry.date))
        })?;
        provided.insert(
            date,
            DayRecord {
                date,
                time_in: entry.time_in.clone(),
                time_out: entry.time_out.clone(),
                lunch_timeout: entry.lunch_timeout.clone().unwrap_or_default(),
                total_hours: entry.total_hours.unwrap_or(0.0),
                status: DayStatus::NotApproved,
                notes: entry.notes.clone(),
            },
        );
    }
    Ok(provided)
}

/// Locate the user's week for the provided entry dates, enforcing the
/// already-submitted guard.
async fn find_open_week(
    state: &AppState,
    user: &User,
    provided: &BTreeMap<NaiveDate, DayRecord>,
) -> Result<(Option<WeekRecord>, NaiveDate, NaiveDate), AppError> {
    let dates: Vec<NaiveDate> = provided.keys().copied().collect();
    let (week_start, week_end) = week_boundaries_from_input(&dates)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let existing = state.store.find_week(&user.id, week_start, week_end).await?;
    if let Some(week) = &existing {
        if week.submitted {
            return Err(AppError::BadRequest(
                "Timesheet for this week is already submitted".to_string(),
            ));
        }
    }
    Ok((existing, week_start, week_end))
}

async fn save_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DraftPayload>,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    let provided = parse_day_entries(&payload.days)?;
    let (existing, week_start, week_end) = find_open_week(&state, &user, &provided).await?;

    let document_id = match existing {
        Some(mut week) => {
            week.merge_days(&provided);
            let days = week.days.clone();
            state.store.set_days(&week.id, days, true).await?;
            week.id
        }
        None => {
            let days = populate_week_days(week_start, week_end, &provided);
            state
                .store
                .insert_week(WeekRecord::new_draft(&user.id, week_start, week_end, days))
                .await?
        }
    };

    state
        .notifier
        .send(Notification::draft_saved(&user.email, week_start));
    Ok(Json(json!({
        "message": "Draft timesheet saved successfully",
        "document_id": document_id,
    })))
}

async fn submit_and_validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubmitPayload>,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    info!("Validating the timesheet data for user {}", user.email);

    let provided = parse_day_entries(&payload.days)?;
    let (existing, week_start, week_end) = find_open_week(&state, &user, &provided).await?;

    // New uploads are appended after whatever the draft already carried.
    let mut image_paths = existing
        .as_ref()
        .map(|w| w.image_paths.clone())
        .unwrap_or_default();
    image_paths.extend(payload.image_paths);
    if image_paths.is_empty() {
        return Err(AppError::BadRequest(
            "No images available for validation and none provided".to_string(),
        ));
    }

    let document_id = match existing {
        Some(mut week) => {
            week.merge_days(&provided);
            let days = week.days.clone();
            state
                .store
                .mark_submitted(&week.id, days, image_paths.clone())
                .await?;
            week.id
        }
        None => {
            let days = populate_week_days(week_start, week_end, &provided);
            let mut week = WeekRecord::new_draft(&user.id, week_start, week_end, days);
            week.is_draft = false;
            week.submitted = true;
            week.image_paths = image_paths.clone();
            state.store.insert_week(week).await?
        }
    };

    state
        .notifier
        .send(Notification::submitted(&user.email, week_start));

    let outcome = state.validator.validate_week(&document_id).await?;
    state.notifier.send(Notification::validation_completed(
        &user.email,
        week_start,
        &outcome.comparison.message,
    ));

    Ok(Json(json!({
        "message": "Final timesheet submitted and validated successfully",
        "document_id": document_id,
        "validation_result": outcome.comparison,
        "files_processed": image_paths.len(),
    })))
}

// --- Timesheet queries ---

async fn list_dates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    let weeks = state.store.weeks_for_user(&user.id).await?;
    let dates = weeks
        .iter()
        .flat_map(|w| w.days.iter())
        .map(|day| day.date.to_string())
        .collect();
    Ok(Json(dates))
}

async fn list_draft_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Value>>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    let weeks = state.store.weeks_for_user(&user.id).await?;
    let entries = weeks
        .iter()
        .filter(|w| w.is_draft && !w.is_validated)
        .flat_map(|w| w.days.iter())
        .filter(|day| day.status != DayStatus::Missing)
        .map(|day| {
            json!({
                "date": day.date.to_string(),
                "time_in": day.time_in.clone().unwrap_or_default(),
                "time_out": day.time_out.clone().unwrap_or_default(),
                "lunch_timeout": day.lunch_timeout.to_string(),
                "total_hours": day.total_hours.to_string(),
            })
        })
        .collect();
    Ok(Json(entries))
}

async fn delete_draft_day(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(date): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    let parsed = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("Invalid date format. Use YYYY-MM-DD".to_string()))?;

    let touched = state.store.clear_draft_day(&user.id, parsed).await?;
    if touched == 0 {
        return Err(AppError::NotFound(format!(
            "No draft timesheet entry found for date {}",
            date
        )));
    }
    Ok(Json(json!({
        "message": format!("Successfully deleted draft timesheet entry for date {}", date),
        "date": date,
    })))
}

// --- Manager review ---

async fn list_timesheets(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WeekRecord>>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    require_manager(&user)?;
    Ok(Json(state.store.all_weeks().await?))
}

async fn approve_timesheet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    require_manager(&user)?;

    let week = state
        .store
        .find_week_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Timesheet not found".to_string()))?;
    if matches!(&week.review, Some(r) if r.status == ReviewStatus::Approved) {
        return Err(AppError::BadRequest("Timesheet is already approved".to_string()));
    }

    state
        .store
        .set_review(
            &id,
            ManagerReview {
                status: ReviewStatus::Approved,
                note: None,
                reviewed_by: user.id.clone(),
                reviewed_at: chrono::Utc::now(),
            },
        )
        .await?;

    if let Some(owner) = state.auth.user_by_id(&week.user_id) {
        state
            .notifier
            .send(Notification::approved(&owner.email, week.week_start));
    }
    Ok(Json(json!({ "message": "Timesheet approved successfully" })))
}

#[derive(Deserialize)]
pub struct RejectPayload {
    pub note: Option<String>,
}

async fn reject_timesheet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<RejectPayload>,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    require_manager(&user)?;

    let note = payload
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("Rejection note is required".to_string()))?
        .to_string();

    let week = state
        .store
        .find_week_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Timesheet not found".to_string()))?;

    state
        .store
        .set_review(
            &id,
            ManagerReview {
                status: ReviewStatus::Rejected,
                note: Some(note.clone()),
                reviewed_by: user.id.clone(),
                reviewed_at: chrono::Utc::now(),
            },
        )
        .await?;

    if let Some(owner) = state.auth.user_by_id(&week.user_id) {
        state
            .notifier
            .send(Notification::rejected(&owner.email, week.week_start, &note));
    }
    Ok(Json(json!({ "message": "Timesheet rejected" })))
}

/// Render a week's day entries as CSV rows, one per calendar day.
fn week_to_csv(week: &WeekRecord) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "date",
            "time_in",
            "time_out",
            "lunch_timeout",
            "total_hours",
            "status",
        ])
        .map_err(|e| AppError::Internal(e.to_string()))?;
    for day in &week.days {
        writer
            .write_record([
                day.date.to_string(),
                day.time_in.clone().unwrap_or_default(),
                day.time_out.clone().unwrap_or_default(),
                day.lunch_timeout.to_string(),
                day.total_hours.to_string(),
                day.status.to_string(),
            ])
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }
    let data = writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    String::from_utf8(data).map_err(|e| AppError::Internal(e.to_string()))
}

async fn export_timesheet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    require_manager(&user)?;

    let week = state
        .store
        .find_week_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Timesheet not found".to_string()))?;
    let body = week_to_csv(&week)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"timesheet_{}.csv\"", week.week_start),
            ),
        ],
        body,
    ))
}

async fn audit_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.user_from_headers(&headers)?;
    require_manager(&user)?;
    let entries = state.audit.entries_for_user(&user_id).await?;
    Ok(Json(json!({
        "message": "Audit entries retrieved successfully",
        "entries": entries,
    })))
}
