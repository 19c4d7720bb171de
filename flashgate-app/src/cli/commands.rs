use crate::api::server as api_server;
use crate::cli::opts::*;

use anyhow::{anyhow, Result};
use chrono::Utc;
use flashgate_core::{
    daily_streak, deck_summary, due_for_review, load_card, per_deck_summaries, ready_for_testing,
    submit_event, summarize_logs, track_deck, CardStateRecord, CardStateRepository, DeckSummary,
    Event, Submission,
};
use flashgate_json::paths::{data_root, default_sqlite_file};
use flashgate_json::JsonStore;
use flashgate_sqlite::SqliteRepo;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn run_cli(args: Cli) -> Result<()> {
    let repo = open_repo(&args.store, args.db_path.clone()).await?;

    if let Command::Api(api) = &args.cmd {
        let addr: std::net::SocketAddr = api.addr.parse()?;
        return api_server::run(repo, addr).await;
    }

    let user = args
        .user
        .ok_or_else(|| anyhow!("--user (or FLASHGATE_USER) is required"))?;
    let now = Utc::now();

    match args.cmd {
        Command::Track(t) => {
            let states = track_deck(&*repo, user, t.deck, &t.cards, now).await?;
            for s in states {
                print_state(&s);
            }
        }
        Command::Untrack { deck } => {
            let n = repo.delete_deck_states(user, deck).await?;
            println!("removed {n}");
        }
        Command::Study { mark, card } => {
            let event = match mark {
                Mark::Know => Event::MarkKnow,
                Mark::DontKnow => Event::MarkDontKnow,
            };
            let s = submit_event(&*repo, user, card, event, now).await?;
            print_submission(&s);
        }
        Command::NextTest { card } => {
            let (_, next) = load_card(&*repo, user, card).await?;
            match next {
                Some(check) => println!("{check}"),
                None => println!("-"),
            }
        }
        Command::Test(t) => {
            let event = Event::PrimaryTest {
                check: t.check,
                correct: !t.failed,
            };
            let s = submit_event(&*repo, user, t.card, event, now).await?;
            print_submission(&s);
        }
        Command::Review { card, failed } => {
            let event = Event::Review { correct: !failed };
            let s = submit_event(&*repo, user, card, event, now).await?;
            print_submission(&s);
        }
        Command::Simple { mark, card } => {
            let event = Event::SimpleReview {
                know: matches!(mark, Mark::Know),
            };
            let s = submit_event(&*repo, user, card, event, now).await?;
            print_submission(&s);
        }
        Command::Show { card } => {
            let (record, next) = load_card(&*repo, user, card).await?;
            let out = serde_json::json!({ "state": record, "next_test_type": next });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Summary(cmd) => {
            if cmd.per_deck {
                let states = repo.list_states(user, cmd.deck).await?;
                for (deck, s) in per_deck_summaries(&states, now) {
                    print_summary(&deck.to_string(), &s);
                }
            } else {
                let s = deck_summary(&*repo, user, cmd.deck, now).await?;
                let label = cmd.deck.map(|d| d.to_string()).unwrap_or_else(|| "all".into());
                print_summary(&label, &s);
            }
        }
        Command::Due(q) => {
            let v = due_for_review(&*repo, user, q.deck, now, q.max).await?;
            if v.is_empty() {
                println!("no cards due");
            }
            for s in v {
                print_state(&s);
            }
        }
        Command::Testable(q) => {
            let v = ready_for_testing(&*repo, user, q.deck, q.max).await?;
            if v.is_empty() {
                println!("no cards ready for testing");
            }
            for s in v {
                print_state(&s);
            }
        }
        Command::History { card } => {
            let logs = repo.list_logs(user, card).await?;
            for l in &logs {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    l.at.to_rfc3339(),
                    l.card_id,
                    l.kind.as_str(),
                    l.check_type.map(|c| c.as_str()).unwrap_or("-"),
                    if l.correct { "ok" } else { "miss" },
                    l.status_after
                );
            }
            let s = summarize_logs(&logs);
            println!(
                "total={} correct={} accuracy={:.0}% streak={}d",
                s.totals.total,
                s.totals.correct,
                s.totals.accuracy() * 100.0,
                daily_streak(&logs, now.date_naive())
            );
        }
        Command::Api(_) => unreachable!("handled above"),
    }
    Ok(())
}

pub async fn open_repo(
    store: &StoreKind,
    db_path: Option<PathBuf>,
) -> Result<Arc<dyn CardStateRepository>> {
    match store {
        StoreKind::Json => {
            let s = match db_path {
                Some(p) => {
                    let backups = p
                        .parent()
                        .map(|d| d.join("backups"))
                        .unwrap_or_else(|| data_root().join("backups"));
                    JsonStore::open_with(p, backups, 10).await?
                }
                None => JsonStore::open_default().await?,
            };
            info!(path = %s.path().display(), "using json store");
            Ok(Arc::new(s))
        }
        StoreKind::Sqlite => {
            let p = db_path.unwrap_or_else(default_sqlite_file);
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let s = SqliteRepo::open_file(&p).await?;
            info!(path = %p.display(), "using sqlite store");
            Ok(Arc::new(s))
        }
    }
}

// ===== Output =====
fn print_state(s: &CardStateRecord) {
    let next = s
        .next_review_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".into());
    println!(
        "{}\t{}\tinterval={}d\tease={:.2}\tnext={}",
        s.card_id, s.status, s.interval_days, s.ease_factor, next
    );
}

fn print_submission(s: &Submission) {
    print_state(&s.record);
    if let Some(check) = s.next_test_type {
        println!("next test: {check}");
    }
}

fn print_summary(label: &str, s: &DeckSummary) {
    let c = &s.by_status;
    println!(
        "{label}\ttotal={}\tnew={}\tlearning={}\ttesting={}\tyoung={}\tmature={}\trelearning={}\tdue={}\ttestable={}",
        s.total,
        c.new,
        c.learning,
        c.testing,
        c.young,
        c.mature,
        c.relearning,
        s.due_for_review,
        s.ready_for_testing
    );
}

