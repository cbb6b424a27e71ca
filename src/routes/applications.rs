use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::{prelude::*, PgConnection, PgTextExpressionMethods};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::ledger::{self, ApplicationFields, ApplicationPatch};
use crate::milestones::{self, MilestoneTag};
use crate::models::Application;
use crate::schema::{application_milestones, applications};
use crate::state::AppState;
use crate::utils::json::classify_field;

#[derive(Deserialize, Default)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub role: String,
    pub location: Option<String>,
    pub link: Option<String>,
    pub source: Option<String>,
    pub compensation: Option<String>,
    pub last_contact: Option<String>,
    pub follow_up_at: Option<String>,
}

impl From<CreateApplicationRequest> for ApplicationFields {
    fn from(value: CreateApplicationRequest) -> Self {
        ApplicationFields {
            company: value.company,
            role: value.role,
            location: value.location,
            link: value.link,
            source: value.source,
            compensation: value.compensation,
            last_contact: value.last_contact,
            follow_up_at: value.follow_up_at,
        }
    }
}

#[derive(Deserialize)]
pub struct DashboardQuery {
    pub q: Option<String>,
    pub milestone: Option<String>,
}

#[derive(Serialize)]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub company: String,
    pub role: String,
    pub location: Option<String>,
    pub link: Option<String>,
    pub source: Option<String>,
    pub compensation: Option<String>,
    pub last_contact: Option<NaiveDate>,
    pub follow_up_at: Option<NaiveDate>,
    pub follow_up_due: bool,
    pub milestones: Vec<MilestoneTag>,
    pub stage: MilestoneTag,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct ApplicationDetailResponse {
    pub application: ApplicationResponse,
}

#[derive(Serialize, Default, Debug, PartialEq, Eq)]
pub struct DashboardSummary {
    pub total: usize,
    pub applied: usize,
    pub interview: usize,
    pub offer: usize,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub applications: Vec<ApplicationResponse>,
    pub summary: DashboardSummary,
}

pub async fn list_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<DashboardQuery>,
) -> AppResult<Json<DashboardResponse>> {
    let mut conn = state.db()?;

    let search = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    // Unknown milestone values are ignored rather than rejected.
    let milestone = params
        .milestone
        .as_deref()
        .and_then(|raw| raw.trim().parse::<MilestoneTag>().ok());

    let mut query = applications::table
        .filter(applications::user_id.eq(user.user_id))
        .into_boxed();

    if let Some(term) = search.as_ref() {
        let pattern = format!("%{}%", escape_like(term));
        query = query.filter(
            applications::company
                .ilike(pattern.clone())
                .or(applications::role.ilike(pattern)),
        );
    }

    if let Some(tag) = milestone {
        query = query.filter(
            applications::id.eq_any(
                application_milestones::table
                    .filter(application_milestones::tag.eq(tag.as_str()))
                    .select(application_milestones::application_id),
            ),
        );
    }

    let apps: Vec<Application> = query
        .order((applications::created_at.desc(), applications::id.asc()))
        .load(&mut conn)?;

    let ids: Vec<Uuid> = apps.iter().map(|app| app.id).collect();
    let mut tags_map = ledger::load_tags(&mut conn, &ids)?;

    debug!(
        user_id = %user.user_id,
        search = ?search,
        milestone = ?milestone,
        count = apps.len(),
        "loaded dashboard"
    );

    let summary = summarize(apps.iter().map(|app| tags_map.get(&app.id)));
    let today = ledger::today();
    let applications = apps
        .into_iter()
        .map(|app| {
            let tags = tags_map.remove(&app.id).unwrap_or_default();
            to_application_response(app, &tags, today)
        })
        .collect();

    Ok(Json(DashboardResponse {
        applications,
        summary,
    }))
}

pub async fn create_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateApplicationRequest>,
) -> AppResult<(StatusCode, Json<ApplicationDetailResponse>)> {
    let mut conn = state.db()?;
    let application = ledger::create_application(&mut conn, user.user_id, payload.into())?;
    let detail = load_detail(&mut conn, application)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ApplicationDetailResponse>> {
    let mut conn = state.db()?;
    let application = ledger::find_owned_application(&mut conn, user.user_id, application_id)?;
    Ok(Json(load_detail(&mut conn, application)?))
}

pub async fn update_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<ApplicationDetailResponse>> {
    if !body.is_object() {
        return Err(AppError::bad_request("expected a JSON object"));
    }

    let field = |key: &str| classify_field(&body, key).map_err(AppError::bad_request);
    let patch = ApplicationPatch {
        company: field("company")?,
        role: field("role")?,
        location: field("location")?,
        link: field("link")?,
        source: field("source")?,
        compensation: field("compensation")?,
        last_contact: field("last_contact")?,
        follow_up_at: field("follow_up_at")?,
    };

    let mut conn = state.db()?;
    let updated = ledger::update_application(&mut conn, user.user_id, application_id, patch)?;
    Ok(Json(load_detail(&mut conn, updated)?))
}

pub async fn delete_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    ledger::delete_application(&mut conn, user.user_id, application_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_milestone(
    State(state): State<AppState>,
    Path((application_id, raw_tag)): Path<(Uuid, String)>,
    user: AuthenticatedUser,
) -> AppResult<Json<ApplicationDetailResponse>> {
    let tag = parse_tag(&raw_tag)?;
    let mut conn = state.db()?;

    ledger::set_milestone(&mut conn, user.user_id, application_id, tag)?;

    let application = ledger::find_owned_application(&mut conn, user.user_id, application_id)?;
    Ok(Json(load_detail(&mut conn, application)?))
}

pub async fn remove_milestone(
    State(state): State<AppState>,
    Path((application_id, raw_tag)): Path<(Uuid, String)>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let tag = parse_tag(&raw_tag)?;
    let mut conn = state.db()?;

    ledger::remove_milestone(&mut conn, user.user_id, application_id, tag)?;

    Ok(StatusCode::NO_CONTENT)
}

fn parse_tag(raw: &str) -> AppResult<MilestoneTag> {
    raw.parse::<MilestoneTag>()
        .map_err(|err| AppError::bad_request(err.to_string()))
}

fn load_detail(
    conn: &mut PgConnection,
    application: Application,
) -> AppResult<ApplicationDetailResponse> {
    let mut tags_map = ledger::load_tags(conn, &[application.id])?;
    let tags = tags_map.remove(&application.id).unwrap_or_default();
    Ok(ApplicationDetailResponse {
        application: to_application_response(application, &tags, ledger::today()),
    })
}

fn to_application_response(
    app: Application,
    tags: &HashSet<MilestoneTag>,
    today: NaiveDate,
) -> ApplicationResponse {
    ApplicationResponse {
        id: app.id,
        company: app.company,
        role: app.role,
        location: app.location,
        link: app.link,
        source: app.source,
        compensation: app.compensation,
        last_contact: app.last_contact,
        follow_up_at: app.follow_up_at,
        follow_up_due: ledger::follow_up_due(app.follow_up_at, today),
        milestones: milestones::ordered(tags),
        stage: milestones::derive_stage(tags),
        created_at: to_iso(app.created_at),
        updated_at: to_iso(app.updated_at),
    }
}

fn summarize<'a>(
    tag_sets: impl Iterator<Item = Option<&'a HashSet<MilestoneTag>>>,
) -> DashboardSummary {
    let mut summary = DashboardSummary::default();
    for tags in tag_sets {
        summary.total += 1;
        let Some(tags) = tags else { continue };
        if tags.contains(&MilestoneTag::Applied) {
            summary.applied += 1;
        }
        if tags.contains(&MilestoneTag::Interview) {
            summary.interview += 1;
        }
        if tags.contains(&MilestoneTag::Offer) {
            summary.offer += 1;
        }
    }
    summary
}

/// Makes `%`, `_` and `\` match literally inside an ILIKE pattern.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[MilestoneTag]) -> HashSet<MilestoneTag> {
        tags.iter().copied().collect()
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("100%_fit"), "100\\%\\_fit");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("Acme"), "Acme");
    }

    #[test]
    fn summary_counts_tagged_applications() {
        let a = set(&[MilestoneTag::Applied, MilestoneTag::Interview]);
        let b = set(&[MilestoneTag::Applied, MilestoneTag::Offer, MilestoneTag::Interview]);
        let c = set(&[MilestoneTag::Rejected]);
        let summary = summarize(vec![Some(&a), Some(&b), Some(&c), None].into_iter());
        assert_eq!(
            summary,
            DashboardSummary {
                total: 4,
                applied: 2,
                interview: 2,
                offer: 1,
            }
        );
    }

    #[test]
    fn response_derives_stage_and_order() {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let app = Application {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company: "Acme".into(),
            role: "Intern".into(),
            location: None,
            link: Some("https://acme.dev/jobs/1".into()),
            source: None,
            compensation: None,
            last_contact: None,
            follow_up_at: NaiveDate::from_ymd_opt(2024, 4, 30),
            created_at: now,
            updated_at: now,
        };
        let tags = set(&[MilestoneTag::Offer, MilestoneTag::Applied, MilestoneTag::Interview]);
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let response = to_application_response(app, &tags, today);
        assert_eq!(response.stage, MilestoneTag::Offer);
        assert_eq!(
            response.milestones,
            vec![
                MilestoneTag::Applied,
                MilestoneTag::Interview,
                MilestoneTag::Offer
            ]
        );
        assert!(response.follow_up_due);
        assert_eq!(response.created_at, "2024-05-01T12:00:00+00:00");
    }
}
