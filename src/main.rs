//! agentdeck: one list of every coding-agent session, remote and local.
//!
//! Usage:
//!   agentdeck                   # Print sessions grouped by priority
//!   agentdeck --filter <name>   # all, attention, active, or a status
//!   agentdeck --json            # Machine-readable snapshot
//!   agentdeck --dismiss <id>    # Hide a session from future refreshes
//!   agentdeck --restore <id>    # Undo a dismissal
//!   agentdeck --watch           # Re-render whenever a source changes

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use agentdeck::aggregate::{DismissedStore, Lane, SessionView, Snapshot, StatusFilter};
use agentdeck::config::Config;
use agentdeck::refresh::Refresher;
use agentdeck::watcher::ChangeWatcher;

/// How long `--watch` waits for more events before re-rendering
const SETTLE: Duration = Duration::from_millis(300);

/// Re-render at least this often so attention timers stay current
const WATCH_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Args {
    json: bool,
    watch: bool,
    filter: Option<String>,
    dismiss: Vec<String>,
    restore: Vec<String>,
}

enum Command {
    Run(Args),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => parsed.json = true,
            "--watch" => parsed.watch = true,
            "--filter" => {
                parsed.filter = Some(args.next().context("--filter needs a value")?);
            }
            "--dismiss" => parsed
                .dismiss
                .push(args.next().context("--dismiss needs a session id")?),
            "--restore" => parsed
                .restore
                .push(args.next().context("--restore needs a session id")?),
            "--help" | "-h" => return Ok(Command::Help),
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(Command::Run(parsed))
}

fn print_help() {
    println!("agentdeck: Aggregated view of coding-agent sessions");
    println!();
    println!("Usage:");
    println!("  agentdeck                  Print sessions grouped by priority");
    println!("  agentdeck --filter <name>  all, attention, active, or a status name");
    println!("  agentdeck --json           Print the snapshot as JSON");
    println!("  agentdeck --dismiss <id>   Hide a session");
    println!("  agentdeck --restore <id>   Show a dismissed session again");
    println!("  agentdeck --watch          Refresh when sources change");
    println!();
    println!("Logging is controlled by RUST_LOG (default: warn).");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let config = Config::load()?;
    let mut dismissed = DismissedStore::new(&Config::config_dir()?)?;

    if !args.dismiss.is_empty() || !args.restore.is_empty() {
        for id in &args.dismiss {
            dismissed.dismiss(id);
            println!("Dismissed {}", id);
        }
        for id in &args.restore {
            if dismissed.restore(id) {
                println!("Restored {}", id);
            } else {
                println!("{} was not dismissed", id);
            }
        }
        return dismissed.save();
    }

    let filter_name = args.filter.as_deref().unwrap_or(&config.default_filter);
    let filter: StatusFilter = filter_name
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let refresher = Refresher::from_config(&config);
    info!(feeds = ?refresher.feed_names(), filter = %filter, "starting refresh");

    if !args.watch {
        return render_once(&refresher, &dismissed, filter, args.json);
    }

    let mut watch_dirs = vec![
        config.sources.session_state_dir.clone(),
        config.sources.logs_dir.clone(),
    ];
    if let Some(parent) = config
        .sources
        .remote_tasks_file
        .as_ref()
        .and_then(|p| p.parent())
    {
        watch_dirs.push(parent.to_path_buf());
    }
    let watcher = ChangeWatcher::new(watch_dirs.as_slice())?;

    loop {
        render_once(&refresher, &dismissed, filter, args.json)?;
        let changed = watcher.wait(WATCH_TICK, SETTLE);
        debug!(changed = changed.len(), "sources changed");
    }
}

fn render_once(
    refresher: &Refresher,
    dismissed: &DismissedStore,
    filter: StatusFilter,
    as_json: bool,
) -> Result<()> {
    let now = Utc::now();
    let snapshot = refresher.refresh(&dismissed.snapshot(), filter, now)?;

    if as_json {
        let warnings: Vec<String> = snapshot.warnings.iter().map(ToString::to_string).collect();
        let value = json!({
            "counts": snapshot.counts,
            "sessions": snapshot.entries,
            "warnings": warnings,
            "partial": snapshot.is_partial(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_snapshot(&snapshot, now);
    }
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot, now: DateTime<Utc>) {
    let tabs: Vec<String> = snapshot
        .counts
        .categories()
        .iter()
        .map(|(label, count)| format!("{} {}", label, count))
        .collect();
    println!("{}", tabs.join(" | "));

    for warning in &snapshot.warnings {
        if warning.is_unavailable() {
            println!("  note: {}", warning);
        } else {
            println!("  warning: {}", warning);
        }
    }

    let mut lane = None;
    for view in &snapshot.entries {
        let current = Lane::of(view.session.status);
        if lane != Some(current) {
            println!();
            println!("{:?}", current);
            lane = Some(current);
        }
        println!("{}", format_row(view, now));
    }

    if snapshot.entries.is_empty() {
        println!();
        println!("No sessions");
    }
}

fn format_row(view: &SessionView, now: DateTime<Utc>) -> String {
    let session = &view.session;
    let marker = if view.needs_attention {
        "!"
    } else if view.quiet_duplicate {
        "~"
    } else {
        " "
    };

    let idle = match session.idle_for(now) {
        Some(d) if d.num_days() > 0 => format!("{}d", d.num_days()),
        Some(d) if d.num_hours() > 0 => format!("{}h", d.num_hours()),
        Some(d) => format!("{}m", d.num_minutes().max(0)),
        None => "-".to_string(),
    };

    let mut row = format!(
        " {} {:<12} {:<40} {}@{} [{}] {}",
        marker,
        session.status.as_str(),
        session.title,
        session.repository,
        session.branch,
        session.source,
        idle
    );
    if let Some(usage) = &session.telemetry {
        row.push_str(&format!(" {} tok", usage.total_tokens()));
    }
    if let Some(number) = session.pr_number {
        row.push_str(&format!(" PR #{}", number));
    }
    row
}
