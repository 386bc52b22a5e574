use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Normalize an email address for case-insensitive keying
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Accept RFC 3339 timestamps as well as the offset-less ISO form older files contain
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// Row-level-security roles assigned to one user for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMapping {
    pub user_email: String,
    pub dataset_id: String,
    pub roles: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
}

impl RoleMapping {
    /// Whether this mapping is keyed by the given (email, dataset) pair
    pub fn matches(&self, email: &str, dataset_id: &str) -> bool {
        self.matches_email(email) && self.dataset_id == dataset_id
    }

    pub fn matches_email(&self, email: &str) -> bool {
        email_key(&self.user_email) == email_key(email)
    }

    /// Comma separated roles for display
    pub fn roles_display(&self) -> String {
        self.roles.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// The set of reports a user may list and open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAccess {
    pub user_email: String,
    pub report_ids: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
}

impl ReportAccess {
    pub fn matches_email(&self, email: &str) -> bool {
        email_key(&self.user_email) == email_key(email)
    }

    pub fn report_count(&self) -> usize {
        self.report_ids.len()
    }
}

/// A user granted access to the admin panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AdminUser {
    pub fn matches_email(&self, email: &str) -> bool {
        email_key(&self.email) == email_key(email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Login,
    ViewReport,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Login => "login",
            ActivityType::ViewReport => "view_report",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "login" => Some(ActivityType::Login),
            "view_report" => Some(ActivityType::ViewReport),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a login or report view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub user_email: String,
    pub user_name: String,
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ActivityRecord {
    /// Formatted timestamp for the admin activity table
    pub fn timestamp_display(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}
