use std::env;
use std::net::SocketAddr;

use tracing::info;
use warband_api::{serve, ServerConfig};
use warband_core::indexer::{ChainIndexer, JsonlLogSource};
use warband_core::news::NewsGenerator;
use warband_core::quests::QuestEngine;
use warband_core::settings::set_indexer_start_block;
use warband_core::store::SqliteLedgerStore;

fn print_usage() {
    println!("warband-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  index");
    println!("    one indexing pass over the relay drop file");
    println!("  quests");
    println!("    one quest-engine pass over unconsumed ledger events");
    println!("  news");
    println!("    one news-generator pass over unconsumed ledger events");
    println!("  set-start-block <block>");
    println!("  status");
    println!("env:");
    println!("  WARBAND_SQLITE_PATH   ledger database (default warband_ledger.sqlite)");
    println!("  WARBAND_RELAY_PATH    relay drop file (default warband_relay.jsonl)");
    println!("  WARBAND_TRIGGER_SECRET / WARBAND_DEBUG_BYPASS  trigger auth");
    println!("  WARBAND_PAY_RECEIVER / WARBAND_PAY_NETWORK     payment gate");
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_block(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing block".to_string())?;
    raw.parse::<u64>().map_err(|_| format!("invalid block: {raw}"))
}

fn sqlite_path() -> String {
    env::var("WARBAND_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "warband_ledger.sqlite".to_string())
}

fn relay_path() -> String {
    env::var("WARBAND_RELAY_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "warband_relay.jsonl".to_string())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

fn open_store() -> Result<SqliteLedgerStore, String> {
    SqliteLedgerStore::open(sqlite_path()).map_err(|err| format!("failed to open ledger: {err}"))
}

fn run_index() -> Result<(), String> {
    let mut store = open_store()?;
    let source = JsonlLogSource::new(relay_path());
    let report = ChainIndexer::index_events(&mut store, &source)
        .map_err(|err| format!("index run failed: {err}"))?;
    println!(
        "indexed={} duplicates={} skipped={} cursor={}",
        report.appended, report.duplicates, report.skipped, report.cursor
    );
    Ok(())
}

fn run_quests() -> Result<(), String> {
    let store = open_store()?;
    let report = QuestEngine::process_pending_events(&store, now_unix())
        .map_err(|err| format!("quest run failed: {err}"))?;
    println!(
        "consumed={} progressed={} completed={}",
        report.consumed, report.progressed, report.completed
    );
    Ok(())
}

fn run_news() -> Result<(), String> {
    let store = open_store()?;
    let report = NewsGenerator::generate_from_events(&store)
        .map_err(|err| format!("news run failed: {err}"))?;
    println!("consumed={} generated={}", report.consumed, report.generated);
    Ok(())
}

fn run_set_start_block(args: &[String]) -> Result<(), String> {
    let block = parse_block(args.get(2))?;
    let store = open_store()?;
    set_indexer_start_block(&store, block)
        .map_err(|err| format!("failed to save start block: {err}"))?;
    println!("indexer start block set to {block}");
    Ok(())
}

fn run_status() -> Result<(), String> {
    let store = open_store()?;
    let head = store
        .latest_seq()
        .map_err(|err| format!("failed to read ledger head: {err}"))?;
    print!("ledger_head={head}");
    for consumer in [
        contracts::CURSOR_INDEXER,
        contracts::CURSOR_QUESTS,
        contracts::CURSOR_NEWS,
    ] {
        let position = store
            .cursor_position(consumer)
            .map_err(|err| format!("failed to read cursor {consumer}: {err}"))?;
        print!(" {consumer}={position}");
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warband=debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                let config = ServerConfig::from_env(addr);
                info!(%addr, sqlite = %config.sqlite_path, "serving warband api");
                if let Err(err) = serve(config).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("index") => {
            if let Err(err) = run_index() {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("quests") => {
            if let Err(err) = run_quests() {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("news") => {
            if let Err(err) = run_news() {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("set-start-block") => {
            if let Err(err) = run_set_start_block(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("status") => {
            if let Err(err) = run_status() {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        _ => {
            print_usage();
        }
    }
}
