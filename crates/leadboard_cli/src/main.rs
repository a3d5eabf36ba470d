//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `leadboard_core` wiring.
//! - Seed a store, load the board, move one lead and print column summaries.
//!
//! Usage: `leadboard_cli [config.json]`

use leadboard_core::{
    init_logging_from, AppConfig, Board, BoardReconciler, InMemoryLeadStore, Lead,
    LeadAttributes, LeadFilter, LeadStore, Priority, SqliteLeadStore, Stage, StoreBackend,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("leadboard_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    init_logging_from(&config.log)?;

    println!("leadboard_core version={}", leadboard_core::core_version());
    let leads = demo_leads();
    match config.store.backend {
        StoreBackend::Memory => {
            let store = InMemoryLeadStore::with_leads(leads)?.with_latency(config.store.latency());
            exercise(BoardReconciler::new(store)).await
        }
        StoreBackend::Sqlite => {
            let path = config
                .store
                .db_path
                .as_deref()
                .ok_or("store.db_path is required for the sqlite backend")?;
            let store = SqliteLeadStore::open(path)?;
            if store.list(&LeadFilter::all()).await?.is_empty() {
                for lead in &leads {
                    store.insert(lead)?;
                }
            }
            exercise(BoardReconciler::new(store)).await
        }
    }
}

async fn exercise<S: LeadStore>(reconciler: BoardReconciler<S>) -> Result<(), Box<dyn Error>> {
    let board = reconciler.load(LeadFilter::all()).await?;
    print_board("loaded", &board);

    let first_incoming = board.column(Stage::Incoming).leads.first().map(|lead| lead.id);
    if let Some(id) = first_incoming {
        let moved = reconciler.move_lead(id, Stage::Decision).await?;
        info!("event=cli_move module=cli status=ok lead_id={id}");
        print_board("after move", &moved);
    }
    Ok(())
}

fn print_board(label: &str, board: &Board) {
    println!("{label}:");
    for summary in board.summaries() {
        println!(
            "  {:<12} leads={} total_cents={}",
            summary.stage.as_str(),
            summary.count,
            summary.total_amount_cents
        );
    }
}

fn demo_leads() -> Vec<Lead> {
    [
        ("Acme renewal", Stage::Incoming, 120_000, Priority::High, "renewal"),
        ("Globex pilot", Stage::Incoming, 45_000, Priority::Medium, "pilot"),
        ("Initech upsell", Stage::Decision, 80_000, Priority::Urgent, "upsell"),
        ("Umbrella audit", Stage::Negotiation, 210_000, Priority::Low, "audit"),
        ("Hooli expansion", Stage::Final, 330_000, Priority::High, "upsell"),
    ]
    .into_iter()
    .map(|(name, stage, amount_cents, priority, tag)| {
        let mut attributes = LeadAttributes::new(name);
        attributes.amount_cents = amount_cents;
        attributes.priority = priority;
        attributes.tags = vec![tag.to_string()];
        Lead::new(stage, attributes)
    })
    .collect()
}
