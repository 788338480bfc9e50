use crate::error::{Result, SyncError};
use crate::member::Member;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_REMOVAL_NOTICE: &str = "Hi! You've been removed from the club's Signal groups \
because your membership is no longer active. Renew your membership and you'll be added back \
automatically on the next sync.";

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Who belongs in a group, written in YAML as e.g.
///
/// ```yaml
/// eligible:
///   any:
///     - role: Committee Member
///     - all: [{activity: Climbing}, {attribute: InductionCompleted}]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    AllMembers,
    Role(String),
    Activity(String),
    Attribute(String),
    Any(Vec<Eligibility>),
    All(Vec<Eligibility>),
    Not(Box<Eligibility>),
}

impl Eligibility {
    pub fn matches(&self, member: &Member) -> bool {
        match self {
            Eligibility::AllMembers => true,
            Eligibility::Role(name) => member.has_role(name),
            Eligibility::Activity(name) => member.has_activity(name),
            Eligibility::Attribute(name) => member.attribute_is_set(name),
            Eligibility::Any(preds) => preds.iter().any(|p| p.matches(member)),
            Eligibility::All(preds) => preds.iter().all(|p| p.matches(member)),
            Eligibility::Not(pred) => !pred.matches(member),
        }
    }
}

// ---------------------------------------------------------------------------
// GroupSpec / GroupsFile
// ---------------------------------------------------------------------------

/// One managed Signal group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    /// Signal group id (base64, as shown by `listGroups`).
    pub id: String,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub eligible: Eligibility,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>, id: impl Into<String>, eligible: Eligibility) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            eligible,
        }
    }
}

/// The group configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsFile {
    pub groups: Vec<GroupSpec>,
    /// Direct message sent to people removed for no longer being members.
    #[serde(default = "default_removal_notice")]
    pub removal_notice: String,
}

fn default_removal_notice() -> String {
    DEFAULT_REMOVAL_NOTICE.to_string()
}

impl GroupsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            SyncError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&data)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let file: GroupsFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for spec in &self.groups {
            if spec.name.trim().is_empty() || spec.id.trim().is_empty() {
                return Err(SyncError::InvalidConfig(
                    "every group needs a name and an id".into(),
                ));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(SyncError::InvalidConfig(format!(
                    "duplicate group name '{}'",
                    spec.name
                )));
            }
            if !ids.insert(spec.id.as_str()) {
                return Err(SyncError::InvalidConfig(format!(
                    "group id '{}' is configured twice",
                    spec.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
