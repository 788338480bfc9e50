use crate::cmd::{block_on, connect};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clubsync_core::config::Config;
use signal_rpc::{Group, GroupPermission};

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let groups = block_on(async {
        let client = connect(config)?;
        let result = client.list_groups().await;
        client.close().await;
        result.context("failed to list groups")
    })?;

    if json {
        return print_json(&groups);
    }
    if groups.is_empty() {
        println!("The account is not in any groups.");
        return Ok(());
    }

    let rows = groups.iter().map(row).collect();
    print_table(
        &["NAME", "ID", "MEMBERS", "ADMINS", "PENDING", "REQUESTING", "LOCKED"],
        rows,
    );
    Ok(())
}

fn row(group: &Group) -> Vec<String> {
    let locked = group.permission_add_member == GroupPermission::OnlyAdmins
        && group.permission_edit_details == GroupPermission::OnlyAdmins;
    vec![
        group.name.clone(),
        group.id.clone(),
        group.members.len().to_string(),
        group.admins.len().to_string(),
        group.pending_members.len().to_string(),
        group.requesting_members.len().to_string(),
        if locked { "yes" } else { "no" }.to_string(),
    ]
}
