use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use live_cache::{InMemoryLivePointer, LiveEventPointer, RedisLivePointer};
use server_api::ApiContext;
use shared::domain::{AwardDraft, AwardId, DemoDraft, DemoId, EventId, Phase};
use storage::Storage;
use tracing_subscriber::EnvFilter;

/// Admin CLI that edits events directly against the database.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/demo_night.db")]
    database_url: String,
    /// Keeps the shared live pointer in step with changes made here.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateEvent {
        name: String,
    },
    ListEvents,
    /// Prints an event with its demos, awards and reveal states.
    ShowEvent {
        event_id: i64,
    },
    AddDemo {
        event_id: i64,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        not_votable: bool,
    },
    AddAward {
        event_id: i64,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        not_votable: bool,
    },
    /// Replaces every demo of the event with one per non-empty line of `file`.
    ImportDemos {
        event_id: i64,
        file: PathBuf,
    },
    Move {
        kind: ItemKind,
        id: i64,
        index: i64,
    },
    Remove {
        kind: ItemKind,
        id: i64,
    },
    SetPhase {
        event_id: i64,
        phase: Phase,
    },
    SetCurrentDemo {
        event_id: i64,
        demo_id: Option<i64>,
    },
    SetWinner {
        award_id: i64,
        demo_id: Option<i64>,
    },
    Reveal {
        award_id: i64,
    },
    Hide {
        award_id: i64,
    },
    Tally {
        award_id: i64,
    },
    StartLive {
        event_id: i64,
    },
    StopLive,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ItemKind {
    Demo,
    Award,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let live: Arc<dyn LiveEventPointer> = match cli.redis_url.as_deref() {
        Some(redis_url) => {
            let pointer = RedisLivePointer::new(redis_url)?;
            pointer.connect().await?;
            Arc::new(pointer)
        }
        None => Arc::new(InMemoryLivePointer::new()),
    };
    let ctx = ApiContext { storage, live };

    run(&ctx, cli.command).await
}

async fn run(ctx: &ApiContext, command: Command) -> Result<()> {
    match command {
        Command::CreateEvent { name } => {
            let event = server_api::create_event(ctx, &name).await?;
            println!("created event_id={}", event.id);
        }
        Command::ListEvents => {
            for event in server_api::list_events(ctx).await? {
                let live = if event.is_live { " (live)" } else { "" };
                println!("{}\t{}\t{}{live}", event.id, event.phase, event.name);
            }
        }
        Command::ShowEvent { event_id } => {
            let aggregate = server_api::get_event_aggregate(ctx, EventId(event_id)).await?;
            println!("{} [{}]", aggregate.event.name, aggregate.event.phase);
            for demo in &aggregate.demos {
                println!("  demo {}\t#{}\t{}", demo.id, demo.index, demo.name);
            }
            for (award, reveal) in aggregate.awards.iter().zip(&aggregate.reveal) {
                let next = if reveal.state.is_actionable() { " <- next" } else { "" };
                println!(
                    "  award {}\t#{}\t{}\t{:?}{next}",
                    award.id, award.index, award.name, reveal.state
                );
            }
            if let Some(suggested) = aggregate.advice.suggested {
                println!("suggested next phase: {suggested}");
            }
            if let Some(warning) = aggregate.advice.warning {
                println!("warning: {warning}");
            }
        }
        Command::AddDemo {
            event_id,
            name,
            description,
            not_votable,
        } => {
            let draft = DemoDraft {
                name,
                description,
                votable: !not_votable,
            };
            let demo = server_api::create_demo(ctx, EventId(event_id), &draft).await?;
            println!("created demo_id={} index={}", demo.id, demo.index);
        }
        Command::AddAward {
            event_id,
            name,
            description,
            not_votable,
        } => {
            let draft = AwardDraft {
                name,
                description,
                votable: !not_votable,
            };
            let award = server_api::create_award(ctx, EventId(event_id), &draft).await?;
            println!("created award_id={} index={}", award.id, award.index);
        }
        Command::ImportDemos { event_id, file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            let drafts: Vec<DemoDraft> = raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|name| DemoDraft {
                    name: name.to_string(),
                    description: String::new(),
                    votable: true,
                })
                .collect();
            let demos = server_api::replace_demos(ctx, EventId(event_id), &drafts).await?;
            println!("imported {} demos", demos.len());
        }
        Command::Move { kind, id, index } => {
            let placed = match kind {
                ItemKind::Demo => server_api::move_demo(ctx, DemoId(id), index).await?.index,
                ItemKind::Award => server_api::move_award(ctx, AwardId(id), index).await?.index,
            };
            println!("{kind:?} {id} now at index {placed}");
        }
        Command::Remove { kind, id } => {
            match kind {
                ItemKind::Demo => {
                    server_api::delete_demo(ctx, DemoId(id)).await?;
                }
                ItemKind::Award => {
                    server_api::delete_award(ctx, AwardId(id)).await?;
                }
            }
            println!("removed {kind:?} {id}");
        }
        Command::SetPhase { event_id, phase } => {
            let update = server_api::set_phase(ctx, EventId(event_id), phase).await?;
            println!("event {} is now in {}", update.event.id, update.event.phase);
            if let Some(warning) = update.advice.warning {
                println!("warning: {warning}");
            }
        }
        Command::SetCurrentDemo { event_id, demo_id } => {
            let event =
                server_api::set_current_demo(ctx, EventId(event_id), demo_id.map(DemoId)).await?;
            println!("current demo: {:?}", event.current_demo_id);
        }
        Command::SetWinner { award_id, demo_id } => {
            let award = server_api::set_winner(ctx, AwardId(award_id), demo_id.map(DemoId)).await?;
            println!("winner of {}: {:?}", award.name, award.winner_id);
        }
        Command::Reveal { award_id } => {
            let event = server_api::reveal_award(ctx, AwardId(award_id)).await?;
            println!("revealed award {:?}", event.current_award_id);
        }
        Command::Hide { award_id } => {
            let event = server_api::hide_award(ctx, AwardId(award_id)).await?;
            println!("current award is now {:?}", event.current_award_id);
        }
        Command::Tally { award_id } => {
            let tally = server_api::tally_votes(ctx, AwardId(award_id)).await?;
            for count in tally.counts {
                println!("demo {}\t{}", count.demo_id, count.votes);
            }
        }
        Command::StartLive { event_id } => {
            let live = server_api::start_live_event(ctx, EventId(event_id)).await?;
            println!("event {} is live in {}", live.event_id, live.phase);
        }
        Command::StopLive => {
            server_api::stop_live_event(ctx).await?;
            println!("no event is live");
        }
    }
    Ok(())
}
