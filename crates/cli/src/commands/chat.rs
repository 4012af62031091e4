//! `deskhive chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use deskhive_config::AppConfig;
use deskhive_context::{BudgetEngine, WarningLevel};
use deskhive_core::client::WorkerClientFactory;
use deskhive_core::event::{DomainEvent, EventBus};
use deskhive_core::layer::{ContextLayer, LayerOrigin, LayerTier};
use deskhive_core::worker::WorkerRole;
use deskhive_providers::AnthropicFactory;
use deskhive_workers::{RestartPolicy, WorkerSupervisor};
use tokio::sync::broadcast;
use tracing::warn;

pub async fn run(message: Option<String>, worker: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    DESKHIVE_API_KEY  = 'sk-ant-...'");
        eprintln!("    ANTHROPIC_API_KEY = 'sk-ant-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!(
            "    {}",
            AppConfig::config_dir().join("config.toml").display()
        );
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let role = WorkerRole::from_str(worker)
        .map_err(|e| format!("{e} (known: main, context-manager, summarizer, planner)"))?;
    let profile = config.role_profile(role);

    // Wire the two core components off one event bus
    let events = Arc::new(EventBus::default());
    // Crash recovery runs on background timers; the watcher reports what they do
    let lifecycle = tokio::spawn(watch_lifecycle(events.subscribe()));
    let factory = AnthropicFactory::from_config(&config)
        .map(|f| Arc::new(f) as Arc<dyn WorkerClientFactory>);
    let policy = RestartPolicy {
        max_attempts: config.restart.max_attempts,
        base_delay: Duration::from_millis(config.restart.base_delay_ms),
        max_delay: Duration::from_millis(config.restart.max_delay_ms),
        cooldown: Duration::from_secs(config.restart.cooldown_secs),
    };

    let mut supervisor = WorkerSupervisor::new(factory, events.clone())
        .with_restart_policy(policy)
        .with_history_window(config.workers.history_window)
        .with_max_message_len(config.workers.max_message_len);
    for r in WorkerRole::all() {
        supervisor = supervisor.with_profile(r, config.role_profile(r));
    }
    let supervisor = Arc::new(supervisor);

    let engine = BudgetEngine::new(events.clone())
        .with_max_tokens(config.budget.max_tokens)
        .with_thresholds(
            config.budget.warning_threshold,
            config.budget.critical_threshold,
        );

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let result = supervisor.send(role, msg).await;
        eprint!("\r              \r");
        let reply = result?;
        println!("{reply}");
        record_reply(&engine, role, &reply);
    } else {
        // Interactive mode
        println!();
        println!("  Deskhive — Interactive Chat");
        println!();
        println!("  Worker:  {} ({role})", profile.display_name);
        println!("  Model:   {}", profile.model_id);
        println!("  Window:  {} messages", config.workers.history_window);
        println!("  Budget:  {} tokens", config.budget.max_tokens);
        println!();
        println!("  Type your message and press Enter.");
        println!("  Type 'exit' or Ctrl+C to quit.");
        println!();

        loop {
            print!("  You > ");
            std::io::stdout().flush()?;

            // Read off the runtime so restart timers keep firing while we wait
            let (read, line) = tokio::task::spawn_blocking(|| {
                let mut buf = String::new();
                std::io::stdin().read_line(&mut buf).map(|n| (n, buf))
            })
            .await??;
            if read == 0 {
                break;
            }
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                break;
            }

            eprint!("  ...");
            match supervisor.send(role, input).await {
                Ok(reply) => {
                    eprint!("\r     \r");
                    println!();
                    for line in reply.lines() {
                        println!("  {} > {line}", profile.display_name);
                    }
                    println!();
                    record_reply(&engine, role, &reply);
                }
                Err(e) => {
                    eprint!("\r     \r");
                    eprintln!("  [Error] {e}");
                    println!();
                }
            }
        }

        println!();
        println!("  Goodbye! 👋");
        println!();
    }

    supervisor.shutdown().await;
    lifecycle.abort();
    Ok(())
}

/// Log worker trouble arriving on the event bus and tell the user when a
/// worker goes out of service. Runs until the bus closes; lagged events are
/// skipped, not fatal.
async fn watch_lifecycle(mut events: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event.as_ref() {
            DomainEvent::WorkerError { role, message, .. } => {
                warn!(role = %role, error = %message, "Worker reported an error");
            }
            DomainEvent::WorkerPermanentlyFailed { role, attempts, .. } => {
                warn!(role = %role, attempts = *attempts, "Worker went out of service");
                eprintln!(
                    "  ⚠️  The {role} worker stopped after {attempts} failed restarts. Send again to retry."
                );
            }
            _ => {}
        }
    }
}

/// Fold a worker reply into the budget engine and surface the budget line
/// once usage leaves the safe zone.
fn record_reply(engine: &BudgetEngine, role: WorkerRole, reply: &str) {
    engine.add_layer(ContextLayer::new(
        role.as_str(),
        LayerTier::Active,
        reply,
        LayerOrigin::Ai,
    ));

    let snapshot = engine.snapshot();
    if snapshot.warning_level != WarningLevel::Safe {
        eprintln!(
            "  [budget: {}] {} / {} tokens ({:.0}% used)",
            snapshot.warning_level,
            snapshot.total_tokens,
            snapshot.max_tokens,
            snapshot.percent_used * 100.0
        );
    }
}
