use clap::Parser;

use aios::cli::{Cli, Commands, ConfigAction};
use aios::config::Config;
use aios::history::{HistoryLog, HistoryRecord, HistoryStore};
use aios::{client, daemon, security};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    security::secure_aios_directory();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Shell);

    if let Commands::Config {
        action: Some(ConfigAction::Path),
    } = command
    {
        println!("{}", Config::path().display());
        return Ok(());
    }

    let config = Config::load()?;
    match command {
        Commands::Shell => client::run_shell(&config.daemon.endpoint()),
        Commands::Daemon => daemon::run_daemon(&config),
        Commands::Send { words } => {
            if !client::run_send(&config.daemon.endpoint(), &words) {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::History {
            limit,
            search,
            stats,
        } => show_history(&config, limit, search.as_deref(), stats),
        Commands::Config { action } => {
            let raw = matches!(action, Some(ConfigAction::Show { raw: true }));
            let shown = if raw { config } else { config.redacted() };
            print!("{}", toml::to_string_pretty(&shown)?);
            Ok(())
        }
    }
}

fn show_history(
    config: &Config,
    limit: usize,
    search: Option<&str>,
    stats: bool,
) -> anyhow::Result<()> {
    let path = config.db.effective_path();
    if !path.exists() {
        println!("No command history available");
        return Ok(());
    }
    let store = HistoryStore::open(&path, config.db.busy_timeout_ms)?;
    let user_id = aios::history::current_user_id();

    if stats {
        let stats = store.stats(user_id)?;
        println!("Total commands:   {}", stats.total);
        println!("Successful:       {}", stats.successful);
        println!("Success rate:     {:.1}%", stats.success_rate);
        println!("Average duration: {:.0}ms", stats.avg_duration_ms);
        return Ok(());
    }

    let records = match search {
        Some(query) => store.search(user_id, query, limit)?,
        None => store.query(user_id, limit)?,
    };
    if records.is_empty() {
        println!("No command history available");
        return Ok(());
    }
    for record in records.iter().rev() {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn format_record(record: &HistoryRecord) -> String {
    let status = match record.success {
        Some(true) => "ok",
        Some(false) => "failed",
        None => "-",
    };
    let when = chrono::DateTime::parse_from_rfc3339(&record.timestamp)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| record.timestamp.clone());
    format!("{:>5}  {when}  {status:<6}  {}", record.id, record.command)
}
