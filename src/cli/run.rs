use std::sync::Arc;

use serde::Serialize;

use crate::budget::Credential;
use crate::config::SyncMode;
use crate::hosting::GitHubTransport;
use crate::scheduler::Scheduler;

use super::{ProjectArgs, init_store, load_settings, open_cache};

fn scheduler(args: &ProjectArgs, shallow: bool) -> anyhow::Result<Scheduler<GitHubTransport>> {
    let store = init_store(&args.data_dir)?;
    let cache = open_cache(&args.data_dir)?;
    let mut settings = load_settings(&args.data_dir)?;
    if shallow {
        settings.sync.mode = SyncMode::Shallow;
    }

    let scheduler = Scheduler::github(
        Arc::new(store),
        Arc::new(cache),
        Credential::from_optional(args.token.clone()),
        settings,
    )?;
    Ok(scheduler)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_sync(args: ProjectArgs, branch: Option<String>, shallow: bool) -> anyhow::Result<()> {
    let scheduler = scheduler(&args, shallow)?;
    let report = scheduler.run(&args.project, branch.as_deref()).await?;

    if args.json {
        return print_json(&report);
    }

    if report.deferred {
        println!(
            "Deferred: fair share {} is below the per-project minimum. Next poll in {}s.",
            report.quota.fair_share, report.next_poll_after_secs
        );
        return Ok(());
    }

    if let Some(discovery) = &report.discovery {
        println!(
            "Branches: {} discovered, {} new, {} empty, {} failed",
            discovery.discovered, discovery.upserted, discovery.skipped, discovery.failed
        );
    }
    for synced in &report.branches {
        println!(
            "  {}: {} observed, {} new commit(s), {} new link(s){}",
            synced.branch,
            synced.observed,
            synced.inserted,
            synced.linked,
            if synced.remaining_work { " (incomplete)" } else { "" }
        );
    }
    if let Some(enrichment) = &report.enrichment {
        println!(
            "Enrichment: {} enriched, {} failed, {} remaining",
            enrichment.enriched_count, enrichment.failed_count, enrichment.remaining_count
        );
    }
    if report.stopped_for_rate_limit {
        println!("Stopped early to preserve the rate budget.");
    }
    println!(
        "{} call(s) spent. Next poll in {}s.",
        report.calls_spent, report.next_poll_after_secs
    );

    Ok(())
}

pub async fn run_discover(args: ProjectArgs) -> anyhow::Result<()> {
    let report = scheduler(&args, false)?.discover(&args.project).await?;

    if args.json {
        return print_json(&report);
    }
    println!(
        "Branches: {} discovered, {} new, {} empty, {} failed{}",
        report.discovered,
        report.upserted,
        report.skipped,
        report.failed,
        if report.stopped_for_rate_limit { " (stopped by rate budget)" } else { "" }
    );
    Ok(())
}

pub async fn run_enrich(args: ProjectArgs) -> anyhow::Result<()> {
    let report = scheduler(&args, false)?.enrich(&args.project).await?;

    if args.json {
        return print_json(&report);
    }
    println!(
        "Enriched {} commit(s), {} failed, {} remaining{}",
        report.enriched_count,
        report.failed_count,
        report.remaining_count,
        if report.stopped_for_rate_limit { " (stopped by rate budget)" } else { "" }
    );
    Ok(())
}

pub fn run_quota(args: ProjectArgs) -> anyhow::Result<()> {
    let status = scheduler(&args, false)?.quota_status(&args.project)?;

    if args.json {
        return print_json(&status);
    }

    println!();
    println!("Rate budget for {}", status.quota.credential_hash);
    println!("{}", "─".repeat(20));
    match &status.snapshot {
        Some(snapshot) => println!(
            "Remaining:   {} of {} (resets {})",
            snapshot.remaining,
            snapshot.limit,
            snapshot.resets_at.to_rfc3339()
        ),
        None => println!("Remaining:   {} of {} (no recent reading)", status.remaining, status.limit),
    }
    println!("Reserve:     {}", status.threshold_remaining);
    println!("Consumed:    {:.1}%", status.quota.consumption_percent);
    println!("Projects:    {}", status.active_projects.len());
    println!(
        "Fair share:  {} (allowed {}, {})",
        status.quota.fair_share,
        status.quota.allowed_calls,
        if status.quota.can_poll { "can poll" } else { "deferred" }
    );
    println!("Calls made:  {}", status.calls_made);
    println!("Next poll:   {}s", status.next_poll_after_secs);
    println!();

    Ok(())
}
