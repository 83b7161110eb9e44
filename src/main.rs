use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use mailtriage::clock::SystemClock;
use mailtriage::config::Config;
use mailtriage::email::labels::print_labels;
use mailtriage::email::MailboxProvider;
use mailtriage::filters::spam::load_ignore_list_or_empty;
use mailtriage::filters::SpamFilter;
use mailtriage::gmail_client::GmailClient;
use mailtriage::model::GeminiClient;
use mailtriage::orchestrator::{Orchestrator, OrchestratorOptions};
use mailtriage::settings::SettingsStore;

/// Senders ignored on every installation.
const DEFAULT_IGNORE_PATTERNS: &[&str] = &["noreply@glassdoor.com", "noreply@reddit.com"];

#[derive(Parser)]
#[command(name = "mailtriage")]
#[command(about = "Gmail triage assistant: classifies unread mail, labels it, drafts replies and cleans up garbage")]
#[command(version = "0.1.0")]
struct Args {
    /// Dry-run mode: analyse emails without writing labels, drafts or deletions
    #[arg(short, long)]
    dry_run: bool,

    /// Daemon mode: run a cycle every check interval until the runtime cap
    #[arg(long)]
    daemon: bool,

    /// Maximum number of emails per cycle (default: from settings)
    #[arg(short = 'l', long)]
    limit: Option<u32>,

    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,

    /// List Gmail labels and exit
    #[arg(long)]
    list_labels: bool,

    /// Only run the garbage cleanup pass
    #[arg(long)]
    cleanup_only: bool,

    /// Add a sender pattern to the ignore list (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Settings document path (default: SETTINGS_PATH or ./settings.json)
    #[arg(short = 's', long)]
    settings: Option<String>,

    /// Daemon lifetime in minutes (default: MAX_RUNTIME_MINUTES or 30)
    #[arg(long)]
    max_runtime_minutes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load the .env file if present
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::init();

    if args.dry_run {
        info!("🧪 Starting mail triage in DRY-RUN mode");
    } else {
        info!("🚀 Starting mail triage");
    }

    let mut config = Config::new()?;

    if let Some(path) = &args.settings {
        config.settings_path = path.clone();
    }
    if let Some(minutes) = args.max_runtime_minutes {
        config.scheduler.max_runtime_minutes = minutes;
    }

    if args.check_config {
        print_config_summary(&config);
        return Ok(());
    }

    let mut ignore_list = load_ignore_list_or_empty(&config.ignore_patterns_path());
    let seeds = DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .chain(args.ignore.iter().cloned());
    if let Err(e) = ignore_list.extend(seeds) {
        warn!("⚠️  Unable to update ignore list: {:#}", e);
    }

    let mut settings = SettingsStore::new(&config.settings_path);

    let gmail = Arc::new(
        GmailClient::new(&config.gmail)
            .await
            .context("Unable to connect to Gmail API")?,
    );

    if args.list_labels {
        let labels = gmail.list_labels().await?;
        print_labels(labels, &settings.load().labels.all());
        return Ok(());
    }

    let model = Arc::new(GeminiClient::new(&config.gemini).context("Unable to create Gemini client")?);
    let interval_minutes = settings.load().rate_limiting.check_interval_minutes;

    let mut orchestrator = Orchestrator::new(
        gmail,
        model,
        Arc::new(SystemClock),
        settings,
        SpamFilter::new(ignore_list),
        OrchestratorOptions {
            sender_name: config.sender_name.clone(),
            backup_dir: config.backup_dir(),
            watermark_path: config.watermark_path(),
            dry_run: args.dry_run,
            limit: args.limit,
        },
    );

    if args.cleanup_only {
        let result = orchestrator.run_garbage_cleanup_pass().await;
        result.print_summary();
        return Ok(());
    }

    if args.daemon {
        info!("🔄 Starting in daemon mode");
        return run_daemon_mode(orchestrator, interval_minutes, config.scheduler.max_runtime_minutes).await;
    }

    let stats = orchestrator.run_cycle().await;
    if stats.errors > 0 {
        warn!("⚠️  Cycle finished with {} error(s)", stats.errors);
    } else {
        info!("✅ Cycle finished. {} email(s) processed.", stats.total_processed);
    }

    Ok(())
}

fn print_config_summary(config: &Config) {
    println!("✅ Configuration valid!");
    println!("📧 Gmail API OAuth2");
    println!("🔑 Credentials: {}", config.gmail.credentials_path);
    println!("💾 Token cache: {}", config.gmail.token_cache_path);
    println!("🤖 Model: {}", config.gemini.model);
    println!("📁 Data directory: {}", config.data_dir);
    println!("✍️  Reply signature: {}", config.sender_name);
    println!("⏱️  Daemon lifetime: {} minutes", config.scheduler.max_runtime_minutes);

    match SettingsStore::read(std::path::Path::new(&config.settings_path)) {
        Ok(settings) => {
            println!("⚙️  Settings: {}", config.settings_path);
            println!(
                "   Rate limits: {}/min, {}/day, every {} min",
                settings.rate_limiting.max_requests_per_minute,
                settings.rate_limiting.daily_limit,
                settings.rate_limiting.check_interval_minutes
            );
            println!("   Max emails per check: {}", settings.email_processing.max_emails_per_check);
            println!(
                "   Garbage cleanup: {} (dry run: {})",
                if settings.garbage_cleanup.enabled { "enabled" } else { "disabled" },
                settings.garbage_cleanup.dry_run_mode
            );
        }
        Err(e) => println!("❌ Settings {}: {:#}", config.settings_path, e),
    }
}

async fn run_daemon_mode(orchestrator: Orchestrator, interval_minutes: u64, max_runtime_minutes: u64) -> Result<()> {
    use tokio_cron_scheduler::{Job, JobScheduler};

    let orchestrator = Arc::new(Mutex::new(orchestrator));
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    info!(
        "📅 Checking every {} minute(s) for up to {} minute(s)",
        interval_minutes.max(1),
        max_runtime_minutes
    );

    run_scheduled_cycle(&orchestrator).await;

    let mut scheduler = JobScheduler::new().await?;

    let job_orchestrator = orchestrator.clone();
    let job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let orchestrator = job_orchestrator.clone();
        Box::pin(async move {
            run_scheduled_cycle(&orchestrator).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("✅ Daemon mode started");
    info!("⏸️  Press Ctrl+C to stop the daemon");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(max_runtime_minutes * 60)) => {
            info!("⏱️  Maximum runtime of {} minutes reached", max_runtime_minutes);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupt received");
        }
    }

    if let Err(e) = scheduler.shutdown().await {
        error!("❌ Error stopping scheduler: {}", e);
    }

    // A cycle in progress is finished, never interrupted
    let _in_flight = orchestrator.lock().await;
    info!("👋 Mail triage daemon stopped");

    Ok(())
}

async fn run_scheduled_cycle(orchestrator: &Mutex<Orchestrator>) {
    let Ok(mut orchestrator) = orchestrator.try_lock() else {
        warn!("⏭️  Previous cycle still running, skipping this tick");
        return;
    };

    orchestrator.refresh_settings();
    let stats = orchestrator.run_cycle().await;
    info!(
        "✅ Scheduled cycle {} done: {} processed, {} error(s)",
        stats.cycle_id, stats.total_processed, stats.errors
    );
}
