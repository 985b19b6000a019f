//! Per-user profile and preference models.
//!
//! Both tables hold at most one row per user and are replaced wholesale on
//! every save. Contact lists are stored as JSON arrays of strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::user::UserResponse;

/// Interface language used when none is stored or supplied
pub const DEFAULT_LANGUAGE: &str = "pt-BR";

#[derive(Debug, Clone, Default, FromRow)]
pub struct ProfileRow {
    pub phone: Option<String>,
    pub team: Option<String>,
    pub role: Option<String>,
    pub timezone: Option<String>,
    pub phones: Option<String>,
    pub emails: Option<String>,
    pub addresses: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PreferencesRow {
    pub email_notifications: bool,
    pub single_session: bool,
    pub module_pipeline: bool,
    pub module_finance: bool,
    pub module_contacts: bool,
    pub module_calendar: bool,
    pub language: Option<String>,
    pub notify_mentions: bool,
    pub notify_pipeline_updates: bool,
    pub notify_finance_alerts: bool,
    pub notify_weekly_summary: bool,
    pub notify_product_updates: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub phone: String,
    pub team: String,
    pub role: String,
    pub timezone: String,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub addresses: Vec<String>,
    pub comments: Vec<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let phone = row.phone.unwrap_or_default();
        let mut phones = parse_string_list(row.phones.as_deref());
        if phones.is_empty() && !phone.is_empty() {
            phones.push(phone.clone());
        }

        Self {
            phone,
            team: row.team.unwrap_or_default(),
            role: row.role.unwrap_or_default(),
            timezone: row.timezone.unwrap_or_default(),
            phones,
            emails: parse_string_list(row.emails.as_deref()),
            addresses: parse_string_list(row.addresses.as_deref()),
            comments: parse_string_list(row.comments.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub email_notifications: bool,
    pub single_session: bool,
    pub module_pipeline: bool,
    pub module_finance: bool,
    pub module_contacts: bool,
    pub module_calendar: bool,
    pub language: String,
    pub notify_mentions: bool,
    pub notify_pipeline_updates: bool,
    pub notify_finance_alerts: bool,
    pub notify_weekly_summary: bool,
    pub notify_product_updates: bool,
}

/// Preferences reported for a user who never saved any
impl Default for Preferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            single_session: false,
            module_pipeline: true,
            module_finance: true,
            module_contacts: true,
            module_calendar: true,
            language: DEFAULT_LANGUAGE.to_string(),
            notify_mentions: true,
            notify_pipeline_updates: true,
            notify_finance_alerts: true,
            notify_weekly_summary: true,
            notify_product_updates: true,
        }
    }
}

impl From<PreferencesRow> for Preferences {
    fn from(row: PreferencesRow) -> Self {
        Self {
            email_notifications: row.email_notifications,
            single_session: row.single_session,
            module_pipeline: row.module_pipeline,
            module_finance: row.module_finance,
            module_contacts: row.module_contacts,
            module_calendar: row.module_calendar,
            language: row
                .language
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            notify_mentions: row.notify_mentions,
            notify_pipeline_updates: row.notify_pipeline_updates,
            notify_finance_alerts: row.notify_finance_alerts,
            notify_weekly_summary: row.notify_weekly_summary,
            notify_product_updates: row.notify_product_updates,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub profile: Profile,
    pub preferences: Preferences,
}

/// Body of `PUT /api/profile`.
///
/// Fields are kept as raw JSON so that wrongly typed values degrade to their
/// empty form instead of rejecting the whole request.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub email: Value,
    #[serde(default)]
    pub phone: Value,
    #[serde(default)]
    pub team: Value,
    #[serde(default)]
    pub role: Value,
    #[serde(default)]
    pub timezone: Value,
    #[serde(default)]
    pub phones: Value,
    #[serde(default)]
    pub emails: Value,
    #[serde(default)]
    pub addresses: Value,
    #[serde(default)]
    pub comments: Value,
    #[serde(default)]
    pub preferences: Value,
}

impl UpdateProfileRequest {
    /// Contact fields of the request, with `phone` falling back to the first
    /// entry of `phones`
    pub fn profile(&self) -> Profile {
        let phones = normalize_string_list(&self.phones);
        let phone = trimmed_string(&self.phone)
            .or_else(|| phones.first().cloned())
            .unwrap_or_default();

        Profile {
            phone,
            team: trimmed_string(&self.team).unwrap_or_default(),
            role: trimmed_string(&self.role).unwrap_or_default(),
            timezone: trimmed_string(&self.timezone).unwrap_or_default(),
            phones,
            emails: normalize_string_list(&self.emails),
            addresses: normalize_string_list(&self.addresses),
            comments: normalize_string_list(&self.comments),
        }
    }

    /// Preference toggles of the request; a missing toggle counts as off
    pub fn preferences(&self) -> Preferences {
        let prefs = &self.preferences;
        let flag = |key: &str| prefs.get(key).map(is_truthy).unwrap_or(false);

        Preferences {
            email_notifications: flag("emailNotifications"),
            single_session: flag("singleSession"),
            module_pipeline: flag("modulePipeline"),
            module_finance: flag("moduleFinance"),
            module_contacts: flag("moduleContacts"),
            module_calendar: flag("moduleCalendar"),
            language: prefs
                .get("language")
                .and_then(trimmed_string)
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            notify_mentions: flag("notifyMentions"),
            notify_pipeline_updates: flag("notifyPipelineUpdates"),
            notify_finance_alerts: flag("notifyFinanceAlerts"),
            notify_weekly_summary: flag("notifyWeeklySummary"),
            notify_product_updates: flag("notifyProductUpdates"),
        }
    }
}

/// Trimmed string value, or `None` when the value is not a string
pub fn trimmed_string(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.trim().to_string())
}

/// Keep the non-empty trimmed strings of a JSON array
pub fn normalize_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a stored JSON list; anything unreadable is an empty list
pub fn parse_string_list(stored: Option<&str>) -> Vec<String> {
    stored
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .map(|v| normalize_string_list(&v))
        .unwrap_or_default()
}

/// Loose boolean reading of a JSON value: `null`, `false`, `0`, `""` are off
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_lists_are_cleaned() {
        assert_eq!(
            parse_string_list(Some(r#"["  a ", "", 3, "b"]"#)),
            vec!["a", "b"]
        );
        assert!(parse_string_list(Some("not json")).is_empty());
        assert!(parse_string_list(Some(r#"{"a":1}"#)).is_empty());
        assert!(parse_string_list(None).is_empty());
    }

    #[test]
    fn test_profile_row_falls_back_to_single_phone() {
        let profile = Profile::from(ProfileRow {
            phone: Some("+55 11 9999".to_string()),
            ..Default::default()
        });
        assert_eq!(profile.phones, vec!["+55 11 9999"]);
        assert_eq!(profile.team, "");
    }

    #[test]
    fn test_request_phone_defaults_to_first_list_entry() {
        let req: UpdateProfileRequest = serde_json::from_value(json!({
            "email": "a@b.c",
            "phones": [" 123 ", "456"],
            "team": 42
        }))
        .unwrap();

        let profile = req.profile();
        assert_eq!(profile.phone, "123");
        assert_eq!(profile.phones, vec!["123", "456"]);
        assert_eq!(profile.team, "");
    }

    #[test]
    fn test_request_missing_toggles_are_off() {
        let req: UpdateProfileRequest = serde_json::from_value(json!({
            "preferences": { "singleSession": true, "language": "  " }
        }))
        .unwrap();

        let prefs = req.preferences();
        assert!(prefs.single_session);
        assert!(!prefs.email_notifications);
        assert!(!prefs.module_calendar);
        assert_eq!(prefs.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_default_preferences() {
        let prefs = Preferences::default();
        assert!(prefs.email_notifications);
        assert!(!prefs.single_session);
        assert_eq!(prefs.language, "pt-BR");

        let json = serde_json::to_value(&prefs).unwrap();
        assert_eq!(json["notifyWeeklySummary"], json!(true));
    }
}
