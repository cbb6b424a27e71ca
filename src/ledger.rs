use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::milestones::MilestoneTag;
use crate::models::{Application, NewApplication, NewApplicationMilestone};
use crate::schema::{application_milestones, applications};
use crate::utils::json::NullableValue;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("application not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Raw user input for a new application, before trimming and validation.
#[derive(Debug, Default, Clone)]
pub struct ApplicationFields {
    pub company: String,
    pub role: String,
    pub location: Option<String>,
    pub link: Option<String>,
    pub source: Option<String>,
    pub compensation: Option<String>,
    pub last_contact: Option<String>,
    pub follow_up_at: Option<String>,
}

/// Column width of `company` and `role`.
pub const MAX_REQUIRED_TEXT_LENGTH: usize = 255;

pub fn require_text(field: &str, value: &str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_REQUIRED_TEXT_LENGTH {
        return Err(LedgerError::validation(format!(
            "{field} must be at most {MAX_REQUIRED_TEXT_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Prefixes `https://` unless the value already carries an http(s) scheme.
pub fn normalize_link(value: Option<&str>) -> Option<String> {
    let link = optional_text(value)?;
    let lowered = link.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        Some(link)
    } else {
        Some(format!("https://{link}"))
    }
}

pub fn parse_optional_date(field: &str, value: Option<&str>) -> LedgerResult<Option<NaiveDate>> {
    match optional_text(value) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| LedgerError::validation(format!("{field} must be a date (YYYY-MM-DD)"))),
    }
}

pub fn create_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    fields: ApplicationFields,
) -> LedgerResult<Application> {
    let new_application = NewApplication {
        id: Uuid::new_v4(),
        user_id,
        company: require_text("company", &fields.company)?,
        role: require_text("role", &fields.role)?,
        location: optional_text(fields.location.as_deref()),
        link: normalize_link(fields.link.as_deref()),
        source: optional_text(fields.source.as_deref()),
        compensation: optional_text(fields.compensation.as_deref()),
        last_contact: parse_optional_date("last_contact", fields.last_contact.as_deref())?,
        follow_up_at: parse_optional_date("follow_up_at", fields.follow_up_at.as_deref())?,
    };

    let application = conn.transaction::<Application, LedgerError, _>(|conn| {
        diesel::insert_into(applications::table)
            .values(&new_application)
            .execute(conn)?;

        diesel::insert_into(application_milestones::table)
            .values(&NewApplicationMilestone {
                application_id: new_application.id,
                tag: MilestoneTag::Applied.as_str(),
            })
            .execute(conn)?;

        Ok(applications::table.find(new_application.id).first(conn)?)
    })?;

    info!(
        application_id = %application.id,
        user_id = %user_id,
        "created application"
    );
    Ok(application)
}

/// Partial update. Omitted fields stay as they are, `Null` clears them.
pub struct ApplicationPatch {
    pub company: NullableValue,
    pub role: NullableValue,
    pub location: NullableValue,
    pub link: NullableValue,
    pub source: NullableValue,
    pub compensation: NullableValue,
    pub last_contact: NullableValue,
    pub follow_up_at: NullableValue,
}

#[derive(AsChangeset)]
#[diesel(table_name = applications)]
struct ApplicationChangeset {
    company: Option<String>,
    role: Option<String>,
    location: Option<Option<String>>,
    link: Option<Option<String>>,
    source: Option<Option<String>>,
    compensation: Option<Option<String>>,
    last_contact: Option<Option<NaiveDate>>,
    follow_up_at: Option<Option<NaiveDate>>,
    updated_at: NaiveDateTime,
}

fn required_change(field: &str, value: NullableValue) -> LedgerResult<Option<String>> {
    match value {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(LedgerError::validation(format!("{field} cannot be null"))),
        NullableValue::String(s) => require_text(field, &s).map(Some),
    }
}

fn optional_change(
    value: NullableValue,
    normalize: impl FnOnce(&str) -> Option<String>,
) -> Option<Option<String>> {
    match value {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(s) => Some(normalize(&s)),
    }
}

fn date_change(field: &str, value: NullableValue) -> LedgerResult<Option<Option<NaiveDate>>> {
    match value {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(s) => parse_optional_date(field, Some(&s)).map(Some),
    }
}

pub fn update_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
    patch: ApplicationPatch,
) -> LedgerResult<Application> {
    let changeset = ApplicationChangeset {
        company: required_change("company", patch.company)?,
        role: required_change("role", patch.role)?,
        location: optional_change(patch.location, |s| optional_text(Some(s))),
        link: optional_change(patch.link, |s| normalize_link(Some(s))),
        source: optional_change(patch.source, |s| optional_text(Some(s))),
        compensation: optional_change(patch.compensation, |s| optional_text(Some(s))),
        last_contact: date_change("last_contact", patch.last_contact)?,
        follow_up_at: date_change("follow_up_at", patch.follow_up_at)?,
        updated_at: Utc::now().naive_utc(),
    };

    let updated = diesel::update(
        applications::table
            .filter(applications::id.eq(application_id))
            .filter(applications::user_id.eq(user_id)),
    )
    .set(&changeset)
    .get_result::<Application>(conn)
    .optional()?
    .ok_or(LedgerError::NotFound)?;

    info!(application_id = %application_id, user_id = %user_id, "updated application");
    Ok(updated)
}

/// Loads an application only when `user_id` owns it.
pub fn find_owned_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
) -> LedgerResult<Application> {
    applications::table
        .filter(applications::id.eq(application_id))
        .filter(applications::user_id.eq(user_id))
        .first::<Application>(conn)
        .optional()?
        .ok_or(LedgerError::NotFound)
}

/// Locks the owned application row until the transaction ends. Milestone
/// writes on one application serialize on this lock.
fn lock_owned_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
) -> LedgerResult<()> {
    applications::table
        .filter(applications::id.eq(application_id))
        .filter(applications::user_id.eq(user_id))
        .select(applications::id)
        .for_update()
        .first::<Uuid>(conn)
        .optional()?
        .ok_or(LedgerError::NotFound)?;
    Ok(())
}

/// Attaches `tag`, clearing whatever it conflicts with, as a single unit.
pub fn set_milestone(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
    tag: MilestoneTag,
) -> LedgerResult<()> {
    let conflicts: Vec<&str> = tag.conflicts().iter().map(|t| t.as_str()).collect();

    let removed = conn.transaction::<usize, LedgerError, _>(|conn| {
        lock_owned_application(conn, user_id, application_id)?;

        let removed = if conflicts.is_empty() {
            0
        } else {
            diesel::delete(
                application_milestones::table
                    .filter(application_milestones::application_id.eq(application_id))
                    .filter(application_milestones::tag.eq_any(conflicts)),
            )
            .execute(conn)?
        };

        diesel::insert_into(application_milestones::table)
            .values(&NewApplicationMilestone {
                application_id,
                tag: tag.as_str(),
            })
            .on_conflict_do_nothing()
            .execute(conn)?;

        Ok(removed)
    })?;

    debug!(
        application_id = %application_id,
        tag = %tag,
        removed,
        "set milestone"
    );
    Ok(())
}

/// Absent tags are not an error.
pub fn remove_milestone(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
    tag: MilestoneTag,
) -> LedgerResult<()> {
    let removed = conn.transaction::<usize, LedgerError, _>(|conn| {
        lock_owned_application(conn, user_id, application_id)?;

        Ok(diesel::delete(
            application_milestones::table
                .filter(application_milestones::application_id.eq(application_id))
                .filter(application_milestones::tag.eq(tag.as_str())),
        )
        .execute(conn)?)
    })?;

    debug!(
        application_id = %application_id,
        tag = %tag,
        removed,
        "removed milestone"
    );
    Ok(())
}

pub fn load_tags(
    conn: &mut PgConnection,
    application_ids: &[Uuid],
) -> LedgerResult<HashMap<Uuid, HashSet<MilestoneTag>>> {
    if application_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, String)> = application_milestones::table
        .filter(application_milestones::application_id.eq_any(application_ids))
        .select((
            application_milestones::application_id,
            application_milestones::tag,
        ))
        .load(conn)?;

    let mut map: HashMap<Uuid, HashSet<MilestoneTag>> = HashMap::new();
    for (application_id, raw) in rows {
        // The CHECK constraint keeps unknown values out; skip rather than fail a read.
        if let Ok(tag) = raw.parse::<MilestoneTag>() {
            map.entry(application_id).or_default().insert(tag);
        }
    }
    Ok(map)
}

/// Deletes an owned application. Its milestones go with it via cascade.
pub fn delete_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
) -> LedgerResult<()> {
    let deleted = diesel::delete(
        applications::table
            .filter(applications::id.eq(application_id))
            .filter(applications::user_id.eq(user_id)),
    )
    .execute(conn)?;

    if deleted == 0 {
        return Err(LedgerError::NotFound);
    }

    info!(application_id = %application_id, user_id = %user_id, "deleted application");
    Ok(())
}

pub fn follow_up_due(follow_up_at: Option<NaiveDate>, today: NaiveDate) -> bool {
    follow_up_at.is_some_and(|due| due <= today)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
