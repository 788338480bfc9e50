use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── JSON-RPC framing ─────────────────────────────────────────────────────

/// One outbound request line.
#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
    pub id: u64,
}

/// Any inbound line: a correlated response (`id` + `result`/`error`) or an
/// unsolicited notification (`method` + `params`).
#[derive(Debug, Deserialize)]
pub(crate) struct RpcIncoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// ─── Groups ───────────────────────────────────────────────────────────────

/// A group participant as reported by `listGroups`. Either field may be
/// missing for contacts that only expose one identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroupMember {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Permission value as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupPermission {
    #[default]
    EveryMember,
    OnlyAdmins,
}

/// Permission value as accepted by `updateGroup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionPolicy {
    EveryMember,
    OnlyAdmins,
}

impl PermissionPolicy {
    pub fn matches(self, current: GroupPermission) -> bool {
        matches!(
            (self, current),
            (PermissionPolicy::EveryMember, GroupPermission::EveryMember)
                | (PermissionPolicy::OnlyAdmins, GroupPermission::OnlyAdmins)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    Enabled,
    EnabledWithApproval,
    Disabled,
}

/// A group as returned by `listGroups`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub message_expiration_time: u64,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    #[serde(default)]
    pub pending_members: Vec<GroupMember>,
    #[serde(default)]
    pub requesting_members: Vec<GroupMember>,
    #[serde(default)]
    pub admins: Vec<GroupMember>,
    #[serde(default)]
    pub permission_add_member: GroupPermission,
    #[serde(default)]
    pub permission_edit_details: GroupPermission,
    #[serde(default)]
    pub permission_send_message: GroupPermission,
    #[serde(default)]
    pub group_invite_link: Option<String>,
}

impl Group {
    /// Numbers across all four membership partitions. Partitions may
    /// overlap; callers that need a set should collect into one.
    pub fn all_numbers(&self) -> impl Iterator<Item = &str> {
        self.admins
            .iter()
            .chain(&self.members)
            .chain(&self.pending_members)
            .chain(&self.requesting_members)
            .filter_map(|m| m.number.as_deref())
    }

    pub fn admin_numbers(&self) -> impl Iterator<Item = &str> {
        self.admins.iter().filter_map(|m| m.number.as_deref())
    }
}

/// Arguments for a permission-only `updateGroup` call. Unset fields are
/// omitted from the request and left unchanged by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupPermissions {
    #[serde(
        rename = "setPermissionAddMember",
        skip_serializing_if = "Option::is_none"
    )]
    pub add_member: Option<PermissionPolicy>,
    #[serde(
        rename = "setPermissionEditDetails",
        skip_serializing_if = "Option::is_none"
    )]
    pub edit_details: Option<PermissionPolicy>,
    #[serde(
        rename = "setPermissionSendMessages",
        skip_serializing_if = "Option::is_none"
    )]
    pub send_messages: Option<PermissionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkState>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupResult {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

// ─── Recipients ───────────────────────────────────────────────────────────

/// One entry of a `getUserStatus` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub recipient: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub is_registered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    Read,
    Viewed,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SendResult {
    #[serde(default)]
    pub timestamp: Option<u64>,
}

// ─── Inbound events ───────────────────────────────────────────────────────

/// Parameters of a `receive` notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiveEvent {
    pub envelope: Envelope,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub subscription: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_number: Option<String>,
    #[serde(default)]
    pub source_uuid: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_device: Option<u32>,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub data_message: Option<DataMessage>,
}

impl Envelope {
    /// Best identifier for replying to the sender: number, then uuid.
    pub fn sender(&self) -> Option<&str> {
        self.source_number
            .as_deref()
            .or(self.source_uuid.as_deref())
            .or(self.source.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}
