use crate::cmd::block_on;
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::NaiveDateTime;
use clubsync_core::{config::Config, directory::DirectoryClient};

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let directory = DirectoryClient::from_config(config)?;
    let mut events = block_on(async {
        directory
            .fetch_events()
            .await
            .context("failed to fetch events")
    })?;
    events.sort_by_key(|e| e.starts_at());

    if json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No published events.");
        return Ok(());
    }

    let rows = events
        .iter()
        .map(|e| {
            vec![
                fmt_time(e.starts_at()),
                fmt_time(e.ends_at()),
                e.label().to_string(),
                e.types.clone(),
            ]
        })
        .collect();
    print_table(&["START", "END", "NAME", "TYPE"], rows);
    Ok(())
}

fn fmt_time(t: Option<NaiveDateTime>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
