use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use client_core::{default_poll_interval, HttpLiveEventSource, LiveEventSync, SyncUpdate};
use shared::{
    domain::{LiveEvent, Phase},
    protocol::EventAggregate,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Follows the live event and prints what the presentation screen shows.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    /// Poll interval in milliseconds. Defaults to 1s in debug builds, 5s in release.
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(default_poll_interval);
    let source = Arc::new(HttpLiveEventSource::new(&args.server_url)?);
    let token = CancellationToken::new();
    let sync = LiveEventSync::spawn(source, interval, token.clone());
    info!(server_url = %args.server_url, ?interval, "following live event");

    let mut updates = sync.subscribe();
    println!("{}", describe(&sync.current()));
    let mut last_phase = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = updates.borrow_and_update().clone();
                let phase = update.live().map(|live| live.phase);
                if phase != last_phase {
                    info!(?phase, "screen switched phase");
                    last_phase = phase;
                }
                println!("{}", describe(&update));
            }
        }
    }

    token.cancel();
    sync.join().await;
    info!("presenter stopped");
    Ok(())
}

fn describe(update: &SyncUpdate) -> String {
    match update {
        SyncUpdate::Pending => "connecting...".to_string(),
        SyncUpdate::Idle => "no event is live".to_string(),
        SyncUpdate::Live { live, aggregate } => describe_live(live, aggregate),
    }
}

fn describe_live(live: &LiveEvent, aggregate: &EventAggregate) -> String {
    match live.phase {
        Phase::Pre => format!(
            "{}: starting soon with {} demos",
            live.name,
            aggregate.demos.len()
        ),
        Phase::Demos => {
            let current = live
                .current_demo_id
                .and_then(|id| aggregate.demos.iter().find(|d| d.id == id));
            match current {
                Some(demo) => format!(
                    "now presenting: {} ({}/{})",
                    demo.name,
                    demo.index + 1,
                    aggregate.demos.len()
                ),
                None => "demos are about to start".to_string(),
            }
        }
        Phase::Voting => {
            let open = aggregate.awards.iter().filter(|a| a.votable).count();
            format!("voting is open for {open} awards")
        }
        Phase::Results => {
            let current = live
                .current_award_id
                .and_then(|id| aggregate.awards.iter().find(|a| a.id == id));
            let Some(award) = current else {
                return "results are coming up".to_string();
            };
            let winner = award
                .winner_id
                .and_then(|id| aggregate.demos.iter().find(|d| d.id == id))
                .map_or("undecided", |d| d.name.as_str());
            format!("{}: {}", award.name, winner)
        }
        Phase::Recap => format!("thanks for coming to {}", live.name),
    }
}
