use crate::cmd::{block_on, connect};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clubsync_core::{
    config::Config,
    directory::DirectoryClient,
    groups::GroupsFile,
    receipts::ReceiptResponder,
    reconcile::{Reconciler, SyncReport},
};

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let directory = DirectoryClient::from_config(config)?;
    let groups = GroupsFile::load(&config.groups_path)
        .with_context(|| format!("failed to load {}", config.groups_path.display()))?;

    let report = block_on(async {
        let members = directory
            .fetch_active_members()
            .await
            .context("failed to fetch the member roster")?;

        let client = connect(config)?;
        let result: clubsync_core::Result<SyncReport> = async {
            ReceiptResponder::attach(&client, config)?;
            Reconciler::new(&client, config)?
                .sync(&groups, &members)
                .await
        }
        .await;
        client.close().await;
        result.context("sync failed")
    })?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.dry_run {
        println!("Dry run: no changes were made.\n");
    }

    let rows = report
        .groups
        .iter()
        .map(|g| {
            vec![
                g.name.clone(),
                g.diff.to_add.len().to_string(),
                g.diff.to_remove.len().to_string(),
                g.added.len().to_string(),
                g.removed.len().to_string(),
                g.failed.len().to_string(),
                g.skipped_unregistered.to_string(),
            ]
        })
        .collect();
    print_table(
        &[
            "GROUP",
            "TO ADD",
            "TO REMOVE",
            "ADDED",
            "REMOVED",
            "FAILED",
            "NO SIGNAL",
        ],
        rows,
    );

    if !report.missing_groups.is_empty() {
        println!("\nNot found: {}", report.missing_groups.join(", "));
    }
    if !report.notified.is_empty() {
        println!("Removal notices: {}", report.notified.len());
    }
}
