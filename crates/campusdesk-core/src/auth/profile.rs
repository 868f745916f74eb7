//! The logged-in user's profile, derived from the login response.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Denormalized snapshot of the logged-in user, built from the login
/// response and persisted next to the credential.
///
/// Identifiers arrive from the backend as either numbers or strings and are
/// normalized to strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(deserialize_with = "id_string")]
    pub tenant_id: String,
    pub role: String,
    #[serde(default, alias = "name", alias = "fullName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "optional_id_string", skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id_string", skip_serializing_if = "Option::is_none")]
    pub week_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id_string", skip_serializing_if = "Option::is_none")]
    pub term_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id_string", skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    /// Any other profile fields the backend returned
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Build a profile from a successful login payload, ignoring the token.
    pub fn from_login_response(payload: &Value) -> Result<Self, serde_json::Error> {
        let mut fields = match payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        fields.remove("token");
        serde_json::from_value(Value::Object(fields))
    }

    /// Session-context identifiers that get their own storage keys,
    /// paired with the key name. Absent identifiers are skipped.
    pub fn context_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            (super::credentials::TENANT_ID_KEY, self.tenant_id.clone()),
            (super::credentials::USER_ID_KEY, self.user_id.clone()),
            (super::credentials::ROLE_KEY, self.role.clone()),
        ];
        let optional = [
            (super::credentials::BRANCH_ID_KEY, &self.branch_id),
            (super::credentials::WEEK_ID_KEY, &self.week_id),
            (super::credentials::TERM_ID_KEY, &self.term_id),
            (super::credentials::COURSE_ID_KEY, &self.course_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                entries.push((key, value.clone()));
            }
        }
        entries.retain(|(_, value)| !value.is_empty());
        entries
    }
}

fn value_to_id(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_login_response_normalizes_ids() {
        let payload = json!({
            "token": "a.b.c",
            "userId": 42,
            "tenantId": "t-9",
            "role": "teacher",
            "name": "Ada Lovelace",
            "branchId": 3,
            "courseId": null,
            "avatarUrl": "https://cdn.example/ada.png"
        });

        let profile = UserProfile::from_login_response(&payload).unwrap();
        assert_eq!(profile.user_id, "42");
        assert_eq!(profile.tenant_id, "t-9");
        assert_eq!(profile.role, "teacher");
        assert_eq!(profile.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.branch_id.as_deref(), Some("3"));
        assert_eq!(profile.course_id, None);
        assert_eq!(profile.extra.get("avatarUrl"), Some(&json!("https://cdn.example/ada.png")));
        assert!(!profile.extra.contains_key("token"));
    }

    #[test]
    fn test_from_login_response_requires_role() {
        let payload = json!({"token": "a.b.c", "userId": 1, "tenantId": 2});
        assert!(UserProfile::from_login_response(&payload).is_err());
    }

    #[test]
    fn test_from_login_response_rejects_non_object() {
        assert!(UserProfile::from_login_response(&json!("token")).is_err());
    }

    #[test]
    fn test_context_entries_skip_missing() {
        let profile = UserProfile::from_login_response(&json!({
            "userId": "u1",
            "tenantId": "t1",
            "role": "admin",
            "termId": "2026-T1"
        }))
        .unwrap();

        let keys: Vec<&str> = profile.context_entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["tenantId", "userId", "role", "termId"]);
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let profile = UserProfile::from_login_response(&json!({
            "userId": "u1",
            "tenantId": "t1",
            "role": "admin"
        }))
        .unwrap();
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value, json!({"userId": "u1", "tenantId": "t1", "role": "admin"}));
    }
}
