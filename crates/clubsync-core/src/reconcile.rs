use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::groups::{GroupSpec, GroupsFile};
use crate::member::Member;
use crate::messenger::Messenger;
use crate::phone::normalize_phone_number;
use serde::Serialize;
use signal_rpc::{Group, GroupPermissions, LinkState, PermissionPolicy};
use std::collections::{BTreeSet, HashSet};

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Planned membership changes for one group, both lists sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl MembershipDiff {
    /// `to_add = expected - existing`, `to_remove = existing - protected`.
    /// `protected` is expected to contain `expected`.
    pub fn compute(
        expected: &BTreeSet<String>,
        existing: &BTreeSet<String>,
        protected: &BTreeSet<String>,
    ) -> Self {
        Self {
            to_add: expected.difference(existing).cloned().collect(),
            to_remove: existing.difference(protected).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Normalized numbers of everyone the group's eligibility rule admits.
/// Members without a usable number are dropped.
pub fn expected_numbers(spec: &GroupSpec, members: &[Member]) -> BTreeSet<String> {
    members
        .iter()
        .filter(|m| spec.eligible.matches(m))
        .filter_map(Member::phone_number)
        .collect()
}

/// Every number in any of the group's four partitions.
pub fn existing_numbers(group: &Group) -> BTreeSet<String> {
    normalized(group.all_numbers())
}

fn normalized<'a>(numbers: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    numbers
        .map(normalize_phone_number)
        .filter(|n| !n.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupOutcome {
    pub name: String,
    pub group_id: String,
    /// What the pass planned to do (after dropping unregistered numbers).
    pub diff: MembershipDiff,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Numbers whose add or remove failed, with the reason.
    pub failed: Vec<(String, String)>,
    pub skipped_unregistered: usize,
    pub permissions_updated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub groups: Vec<GroupOutcome>,
    /// Configured groups the account could not see.
    pub missing_groups: Vec<String>,
    /// Numbers sent (or, in a dry run, due) the removal notice.
    pub notified: Vec<String>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Brings Signal groups in line with the membership directory.
///
/// Holds no state of its own between calls; every pass recomputes the diff
/// from the roster and the live group listing.
pub struct Reconciler<'a, M> {
    messenger: &'a M,
    config: &'a Config,
    account: String,
}

impl<'a, M: Messenger> Reconciler<'a, M> {
    pub fn new(messenger: &'a M, config: &'a Config) -> Result<Self> {
        Ok(Self {
            messenger,
            config,
            account: normalize_phone_number(config.signal_user()?),
        })
    }

    /// One full pass: every configured group in order, then removal notices.
    /// A group that cannot be found is logged and skipped.
    pub async fn sync(&self, groups: &GroupsFile, members: &[Member]) -> Result<SyncReport> {
        let listed = self.messenger.list_groups().await?;
        tracing::info!(
            configured = groups.groups.len(),
            visible = listed.len(),
            members = members.len(),
            dry_run = self.config.dry_run,
            "starting sync"
        );

        let mut report = SyncReport {
            dry_run: self.config.dry_run,
            ..Default::default()
        };
        for spec in &groups.groups {
            match self.reconcile_listed(spec, members, &listed).await {
                Ok(outcome) => report.groups.push(outcome),
                Err(e) => {
                    tracing::error!(group = %spec.name, error = %e, "skipping group");
                    report.missing_groups.push(spec.name.clone());
                }
            }
        }

        report.notified = self
            .notify_removed(&report.groups, members, &groups.removal_notice)
            .await;
        Ok(report)
    }

    /// Reconcile a single group against a fresh listing.
    pub async fn reconcile_group(
        &self,
        spec: &GroupSpec,
        members: &[Member],
    ) -> Result<GroupOutcome> {
        let listed = self.messenger.list_groups().await?;
        self.reconcile_listed(spec, members, &listed).await
    }

    async fn reconcile_listed(
        &self,
        spec: &GroupSpec,
        members: &[Member],
        listed: &[Group],
    ) -> Result<GroupOutcome> {
        let group = listed
            .iter()
            .find(|g| g.id == spec.id)
            .ok_or_else(|| SyncError::GroupNotFound {
                name: spec.name.clone(),
                group_id: spec.id.clone(),
            })?;

        let expected = expected_numbers(spec, members);
        let existing = existing_numbers(group);
        let mut outcome = GroupOutcome {
            name: spec.name.clone(),
            group_id: group.id.clone(),
            ..Default::default()
        };

        if expected.is_empty() && existing.is_empty() {
            tracing::info!(group = %spec.name, "no eligible or current members; nothing to do");
            return Ok(outcome);
        }

        outcome.permissions_updated = self.restrict_permissions(spec, group).await;

        let mut protected = expected.clone();
        protected.extend(normalized(group.admin_numbers()));
        if !self.account.is_empty() {
            protected.insert(self.account.clone());
        }

        let mut diff = MembershipDiff::compute(&expected, &existing, &protected);
        if !diff.to_add.is_empty() {
            let registered = self.messenger.registered_numbers(&diff.to_add).await;
            outcome.skipped_unregistered = diff.to_add.len().saturating_sub(registered.len());
            if outcome.skipped_unregistered > 0 {
                tracing::info!(
                    group = %spec.name,
                    count = outcome.skipped_unregistered,
                    "skipping eligible members without a Signal account"
                );
            }
            diff.to_add = registered;
        }

        tracing::info!(
            group = %spec.name,
            expected = expected.len(),
            existing = existing.len(),
            to_add = diff.to_add.len(),
            to_remove = diff.to_remove.len(),
            "planned membership changes"
        );
        if !diff.to_remove.is_empty() {
            tracing::info!(group = %spec.name, numbers = %self.show(&diff.to_remove), "to remove");
        }
        if !diff.to_add.is_empty() {
            tracing::info!(group = %spec.name, numbers = %self.show(&diff.to_add), "to add");
        }
        outcome.diff = diff.clone();

        if self.config.dry_run {
            if !diff.is_empty() {
                tracing::info!(group = %spec.name, "dry run: membership left unchanged");
            }
            return Ok(outcome);
        }

        if !diff.to_remove.is_empty() {
            let result = self
                .messenger
                .remove_numbers_from_group(&group.id, &diff.to_remove)
                .await;
            outcome.removed = result.applied;
            outcome.failed.extend(result.failed);
        }
        if !diff.to_add.is_empty() {
            let result = self
                .messenger
                .add_numbers_to_group(&group.id, &diff.to_add)
                .await;
            outcome.added = result.applied;
            outcome.failed.extend(result.failed);
        }

        tracing::info!(
            group = %spec.name,
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            failed = outcome.failed.len(),
            "group reconciled"
        );
        Ok(outcome)
    }

    /// Make sure only admins can add members or edit details, and that the
    /// invite link requires approval. Returns whether an update was applied.
    async fn restrict_permissions(&self, spec: &GroupSpec, group: &Group) -> bool {
        let admins_only = PermissionPolicy::OnlyAdmins;
        if admins_only.matches(group.permission_add_member)
            && admins_only.matches(group.permission_edit_details)
        {
            return false;
        }

        if self.config.dry_run {
            tracing::info!(group = %spec.name, "dry run: would restrict group permissions to admins");
            return false;
        }

        let permissions = GroupPermissions {
            add_member: Some(admins_only),
            edit_details: Some(admins_only),
            send_messages: None,
            link: Some(LinkState::EnabledWithApproval),
        };
        match self
            .messenger
            .set_group_permissions(&group.id, &permissions)
            .await
        {
            Ok(()) => {
                tracing::info!(group = %spec.name, "restricted group permissions to admins");
                true
            }
            Err(e) => {
                tracing::warn!(group = %spec.name, error = %e, "failed to update group permissions");
                false
            }
        }
    }

    /// Direct-message everyone removed this pass who is no longer on the
    /// active roster. Each number is messaged at most once.
    async fn notify_removed(
        &self,
        outcomes: &[GroupOutcome],
        members: &[Member],
        notice: &str,
    ) -> Vec<String> {
        let roster: HashSet<String> = members.iter().filter_map(Member::phone_number).collect();
        let lapsed: BTreeSet<&str> = outcomes
            .iter()
            .flat_map(|o| {
                if self.config.dry_run {
                    &o.diff.to_remove
                } else {
                    &o.removed
                }
            })
            .map(String::as_str)
            .filter(|n| !roster.contains(*n))
            .collect();

        let mut notified = Vec::new();
        for number in lapsed {
            let shown = self.config.show_number(number);
            if self.config.dry_run {
                tracing::info!(number = %shown, "dry run: would send removal notice");
                notified.push(number.to_string());
                continue;
            }
            match self.messenger.send_message(number, notice).await {
                Ok(()) => {
                    tracing::info!(number = %shown, "sent removal notice");
                    notified.push(number.to_string());
                }
                Err(e) => tracing::warn!(number = %shown, error = %e, "failed to send removal notice"),
            }
        }
        notified
    }

    fn show(&self, numbers: &[String]) -> String {
        numbers
            .iter()
            .map(|n| self.config.show_number(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::Eligibility;
    use crate::member::Role;
    use crate::messenger::fake::{Call, FakeMessenger};
    use signal_rpc::{GroupMember, GroupPermission};

    const ACCOUNT: &str = "+447700900000";

    fn config(dry_run: bool) -> Config {
        Config::from_lookup(|key| match key {
            "SIGNAL_USER" => Some(ACCOUNT.into()),
            "DRY_RUN" if dry_run => Some("true".into()),
            _ => None,
        })
        .unwrap()
    }

    fn set(xs: &[&str]) -> BTreeSet<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn strings(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn people(numbers: &[&str]) -> Vec<GroupMember> {
        numbers
            .iter()
            .map(|n| GroupMember {
                number: Some(n.to_string()),
                uuid: None,
            })
            .collect()
    }

    fn group(id: &str, admins: &[&str], members: &[&str]) -> Group {
        Group {
            id: id.into(),
            name: id.into(),
            admins: people(admins),
            members: people(members),
            permission_add_member: GroupPermission::OnlyAdmins,
            permission_edit_details: GroupPermission::OnlyAdmins,
            ..Default::default()
        }
    }

    fn member(phone: &str, roles: &[&str]) -> Member {
        Member {
            mobile_telephone: phone.into(),
            roles: roles
                .iter()
                .map(|r| Role {
                    id: None,
                    name: r.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn committee() -> GroupSpec {
        GroupSpec::new("Committee", "committee-id", Eligibility::Role("Committee".into()))
    }

    fn roster() -> Vec<Member> {
        vec![
            member("+447700900001", &["Committee"]),
            member("07700900002", &[]),
        ]
    }

    fn committee_group() -> Group {
        group("committee-id", &[ACCOUNT], &["+447700900099"])
    }

    #[test]
    fn diff_of_overlapping_sets() {
        let expected = set(&["A", "B"]);
        let existing = set(&["B", "C"]);
        let diff = MembershipDiff::compute(&expected, &existing, &expected);
        assert_eq!(diff.to_add, strings(&["A"]));
        assert_eq!(diff.to_remove, strings(&["C"]));
    }

    #[test]
    fn diff_never_removes_protected_numbers() {
        let expected = set(&["A"]);
        let existing = set(&["A", "ADMIN", "SELF", "C"]);
        let protected = set(&["A", "ADMIN", "SELF"]);
        let diff = MembershipDiff::compute(&expected, &existing, &protected);
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, strings(&["C"]));
    }

    #[test]
    fn expected_numbers_are_normalized_and_deduplicated() {
        let members = vec![
            member("07700 900001", &["Committee"]),
            member("+447700900001", &["Committee"]),
            member("", &["Committee"]),
            member("07700900002", &[]),
        ];
        assert_eq!(expected_numbers(&committee(), &members), set(&["+447700900001"]));
    }

    #[tokio::test]
    async fn committee_scenario_removes_stranger_and_adds_member() {
        let fake = FakeMessenger::with_groups(vec![committee_group()]);
        let cfg = config(false);
        let reconciler = Reconciler::new(&fake, &cfg).unwrap();

        let outcome = reconciler.reconcile_group(&committee(), &roster()).await.unwrap();

        assert_eq!(
            fake.mutations(),
            vec![
                Call::Remove("committee-id".into(), strings(&["+447700900099"])),
                Call::Add("committee-id".into(), strings(&["+447700900001"])),
            ]
        );
        assert_eq!(outcome.removed, strings(&["+447700900099"]));
        assert_eq!(outcome.added, strings(&["+447700900001"]));
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn dry_run_plans_the_same_but_mutates_nothing() {
        let live = FakeMessenger::with_groups(vec![committee_group()]);
        let live_cfg = config(false);
        let planned_live = Reconciler::new(&live, &live_cfg)
            .unwrap()
            .reconcile_group(&committee(), &roster())
            .await
            .unwrap()
            .diff;

        let mut dry_group = committee_group();
        dry_group.permission_add_member = GroupPermission::EveryMember;
        let dry = FakeMessenger::with_groups(vec![dry_group]);
        let dry_cfg = config(true);
        let files = GroupsFile {
            groups: vec![committee()],
            removal_notice: "bye".into(),
        };
        let report = Reconciler::new(&dry, &dry_cfg)
            .unwrap()
            .sync(&files, &roster())
            .await
            .unwrap();

        assert!(dry.mutations().is_empty(), "{:?}", dry.mutations());
        assert!(report.dry_run);
        assert_eq!(report.groups[0].diff, planned_live);
        assert!(report.groups[0].added.is_empty());
        assert_eq!(report.notified, strings(&["+447700900099"]));
    }

    #[tokio::test]
    async fn admins_and_account_are_never_removed() {
        let fake = FakeMessenger::with_groups(vec![group(
            "committee-id",
            &[ACCOUNT, "+447700900050"],
            &["+447700900001"],
        )]);
        let cfg = config(false);
        let outcome = Reconciler::new(&fake, &cfg)
            .unwrap()
            .reconcile_group(&committee(), &roster())
            .await
            .unwrap();

        assert!(outcome.diff.is_empty());
        assert!(fake.mutations().is_empty());
    }

    #[tokio::test]
    async fn empty_group_with_no_eligible_members_is_a_no_op() {
        let mut g = group("committee-id", &[], &[]);
        g.permission_add_member = GroupPermission::EveryMember;
        let fake = FakeMessenger::with_groups(vec![g]);
        let cfg = config(false);
        let outcome = Reconciler::new(&fake, &cfg)
            .unwrap()
            .reconcile_group(&committee(), &[member("07700900002", &[])])
            .await
            .unwrap();

        assert!(outcome.diff.is_empty());
        assert_eq!(fake.calls(), vec![Call::ListGroups]);
    }

    #[tokio::test]
    async fn unregistered_numbers_are_skipped() {
        let mut fake = FakeMessenger::with_groups(vec![group("committee-id", &[ACCOUNT], &[])]);
        fake.unregistered.insert("+447700900001".into());
        let cfg = config(false);
        let outcome = Reconciler::new(&fake, &cfg)
            .unwrap()
            .reconcile_group(&committee(), &roster())
            .await
            .unwrap();

        assert_eq!(outcome.skipped_unregistered, 1);
        assert!(outcome.diff.to_add.is_empty());
        assert!(fake.mutations().is_empty());
    }

    #[tokio::test]
    async fn open_permissions_are_restricted_and_failures_do_not_stop_the_pass() {
        let mut g = group("committee-id", &[ACCOUNT], &[]);
        g.permission_edit_details = GroupPermission::EveryMember;
        let mut fake = FakeMessenger::with_groups(vec![g]);
        fake.fail_permissions = true;
        let cfg = config(false);
        let outcome = Reconciler::new(&fake, &cfg)
            .unwrap()
            .reconcile_group(&committee(), &roster())
            .await
            .unwrap();

        let expected = GroupPermissions {
            add_member: Some(PermissionPolicy::OnlyAdmins),
            edit_details: Some(PermissionPolicy::OnlyAdmins),
            send_messages: None,
            link: Some(LinkState::EnabledWithApproval),
        };
        assert_eq!(
            fake.mutations(),
            vec![
                Call::SetPermissions("committee-id".into(), expected),
                Call::Add("committee-id".into(), strings(&["+447700900001"])),
            ]
        );
        assert!(!outcome.permissions_updated);
    }

    #[tokio::test]
    async fn missing_group_is_reported_and_others_continue() {
        let fake = FakeMessenger::with_groups(vec![committee_group()]);
        let cfg = config(false);
        let files = GroupsFile {
            groups: vec![
                GroupSpec::new("Ghost", "ghost-id", Eligibility::AllMembers),
                committee(),
            ],
            removal_notice: "bye".into(),
        };
        let report = Reconciler::new(&fake, &cfg)
            .unwrap()
            .sync(&files, &roster())
            .await
            .unwrap();

        assert_eq!(report.missing_groups, strings(&["Ghost"]));
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].added, strings(&["+447700900001"]));
        assert_eq!(
            fake.calls().iter().filter(|c| **c == Call::ListGroups).count(),
            1
        );
    }

    #[tokio::test]
    async fn removal_notice_goes_only_to_lapsed_members_once() {
        let fake = FakeMessenger::with_groups(vec![
            committee_group(),
            group("social-id", &[ACCOUNT], &["+447700900099", "+447700900002"]),
        ]);
        let cfg = config(false);
        let files = GroupsFile {
            groups: vec![
                committee(),
                GroupSpec::new("Social", "social-id", Eligibility::Role("Social".into())),
            ],
            removal_notice: "Your membership has lapsed".into(),
        };
        let report = Reconciler::new(&fake, &cfg)
            .unwrap()
            .sync(&files, &roster())
            .await
            .unwrap();

        // +447700900002 is still a member, just not eligible for Social
        assert_eq!(report.notified, strings(&["+447700900099"]));
        let messages: Vec<Call> = fake
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Message(..)))
            .collect();
        assert_eq!(
            messages,
            vec![Call::Message(
                "+447700900099".into(),
                "Your membership has lapsed".into()
            )]
        );
    }

    #[tokio::test]
    async fn failed_removals_are_reported_and_not_notified() {
        let mut fake = FakeMessenger::with_groups(vec![committee_group()]);
        fake.fail_remove = true;
        let cfg = config(false);
        let files = GroupsFile {
            groups: vec![committee()],
            removal_notice: "bye".into(),
        };
        let report = Reconciler::new(&fake, &cfg)
            .unwrap()
            .sync(&files, &roster())
            .await
            .unwrap();

        let outcome = &report.groups[0];
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.failed[0].0, "+447700900099");
        assert_eq!(outcome.added, strings(&["+447700900001"]));
        assert!(report.notified.is_empty());
    }

    #[test]
    fn reconciler_requires_an_account() {
        let fake = FakeMessenger::default();
        let cfg = Config::from_lookup(|_| None).unwrap();
        assert!(matches!(
            Reconciler::new(&fake, &cfg),
            Err(SyncError::MissingConfig("SIGNAL_USER"))
        ));
    }
}
