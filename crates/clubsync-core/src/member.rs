use crate::phone::normalize_phone_number;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// `null` in the payload means "none", same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// A current club member as returned by the directory's `users` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Member {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub surname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mobile_telephone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub home_telephone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub business_telephone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<Role>,
    /// Custom fields. `Activities` is a list of names; the rest are booleans,
    /// dates or free text depending on how the club set them up.
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    #[serde(rename = "ID", default)]
    pub id: Option<u64>,
    pub name: String,
}

impl Member {
    /// The member's number in canonical form: the first of mobile, home and
    /// business that normalizes to something usable.
    pub fn phone_number(&self) -> Option<String> {
        [
            &self.mobile_telephone,
            &self.home_telephone,
            &self.business_telephone,
        ]
        .into_iter()
        .map(|raw| normalize_phone_number(raw))
        .find(|n| !n.is_empty())
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r.name.trim().eq_ignore_ascii_case(name.trim()))
    }

    pub fn has_activity(&self, name: &str) -> bool {
        self.attributes
            .get("Activities")
            .and_then(Value::as_array)
            .is_some_and(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .any(|a| a.eq_ignore_ascii_case(name))
            })
    }

    /// Whether a custom field is set: `true`, a non-zero number, a non-empty
    /// string (dates included) or a non-empty list.
    pub fn attribute_is_set(&self, name: &str) -> bool {
        match self.attributes.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A published (non-draft) club event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClubEvent {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub types: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl ClubEvent {
    /// `Name`, falling back to `Title` for older events.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.title
        } else {
            &self.name
        }
    }

    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        self.start_time.as_deref().and_then(parse_timestamp)
    }

    pub fn ends_at(&self) -> Option<NaiveDateTime> {
        self.end_time.as_deref().and_then(parse_timestamp)
    }
}

/// Directory timestamps come with or without an offset, and occasionally as
/// bare dates.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Member {
        serde_json::from_str(json).expect("failed to parse member")
    }

    #[test]
    fn parse_full_user() {
        let m = parse(
            r#"{
                "ID": 42,
                "Username": "sam",
                "Title": "Mx",
                "Forename": "Sam",
                "MiddleName": "",
                "Surname": "Jones",
                "HomeTelephone": "",
                "BusinessTelephone": "",
                "MobileTelephone": "07700 900001",
                "Email": "sam@example.org",
                "Roles": [{"ID": 3, "Name": "Committee Member", "SecurityLevel": 2, "MembershipSubset": null}],
                "Attributes": {"Activities": ["Climbing", "Walking"], "InductionCompleted": "2023-04-01"}
            }"#,
        );
        assert_eq!(m.id, 42);
        assert_eq!(m.phone_number().as_deref(), Some("+447700900001"));
        assert!(m.has_role("committee member"));
        assert!(m.has_activity("Climbing"));
        assert!(!m.has_activity("Kayaking"));
        assert!(m.attribute_is_set("InductionCompleted"));
    }

    #[test]
    fn nulls_are_treated_as_empty() {
        let m = parse(
            r#"{"ID": 1, "Forename": null, "MobileTelephone": null, "Roles": null, "Attributes": null}"#,
        );
        assert!(m.roles.is_empty());
        assert!(m.attributes.is_empty());
        assert_eq!(m.phone_number(), None);
        assert!(!m.has_activity("Climbing"));
    }

    #[test]
    fn phone_priority_is_mobile_home_business() {
        let m = Member {
            mobile_telephone: "0".into(),
            home_telephone: "01273 123456".into(),
            business_telephone: "07700 900003".into(),
            ..Default::default()
        };
        assert_eq!(m.phone_number().as_deref(), Some("+441273123456"));
    }

    #[test]
    fn attribute_truthiness() {
        let m = parse(
            r#"{"ID": 1, "Attributes": {"Yes": true, "No": false, "Blank": " ", "Zero": 0, "Count": 2, "Empty": []}}"#,
        );
        assert!(m.attribute_is_set("Yes"));
        assert!(!m.attribute_is_set("No"));
        assert!(!m.attribute_is_set("Blank"));
        assert!(!m.attribute_is_set("Zero"));
        assert!(m.attribute_is_set("Count"));
        assert!(!m.attribute_is_set("Empty"));
        assert!(!m.attribute_is_set("Missing"));
    }

    #[test]
    fn event_timestamps_parse_in_common_shapes() {
        let e: ClubEvent = serde_json::from_str(
            r#"{"ID": 7, "Title": "Beginners climbing", "StartTime": "2024-05-01T18:30:00", "EndTime": "2024-05-01T21:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(e.label(), "Beginners climbing");
        assert_eq!(
            e.starts_at().unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-05-01 18:30"
        );
        assert_eq!(e.ends_at().unwrap().format("%H:%M").to_string(), "21:00");
        assert_eq!(parse_timestamp("2024-05-01").unwrap().format("%H").to_string(), "00");
        assert!(parse_timestamp("next tuesday").is_none());
    }
}
