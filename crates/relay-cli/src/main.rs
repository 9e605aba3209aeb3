use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relay_core::app::{
    IndexRoutingPublisher, ListenerGroup, MessageHandler, ProjectPublisher, SweepGuard,
};
use relay_core::domain::{IndexRouteId, Message, ProjectId, RelayError};
use relay_core::impls::{InMemoryLedger, InMemoryTransport};
use relay_core::ports::Ledger;
use relay_core::{RelayBuilder, RelayConfig};

/// Run the relay in memory against a flaky downstream and watch the idle
/// message verifier recover every failed delivery.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
struct Args {
    /// TOML config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `staleness_interval_secs` (listener lock TTL and sweep period).
    #[arg(long)]
    interval_secs: Option<u64>,

    /// How many project / index-route events to publish.
    #[arg(long, default_value_t = 3)]
    rounds: usize,

    /// Failures the downstream produces per message before succeeding.
    #[arg(long, default_value_t = 1)]
    fail_first: u32,

    /// Give up waiting after this many sweep periods.
    #[arg(long, default_value_t = 10)]
    max_periods: u32,
}

/// Downstream that fails the first `fail_first` deliveries of every message.
struct FlakyDownstream {
    fail_first: u32,
    seen: Mutex<Vec<Message>>,
    done: Mutex<HashSet<String>>,
}

impl FlakyDownstream {
    fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            seen: Mutex::new(Vec::new()),
            done: Mutex::new(HashSet::new()),
        }
    }

    async fn completed(&self) -> usize {
        self.done.lock().await.len()
    }
}

#[async_trait]
impl MessageHandler for FlakyDownstream {
    async fn handle(&self, message: &Message) -> Result<(), RelayError> {
        let mut seen = self.seen.lock().await;
        seen.push(message.clone());
        let attempts = seen.iter().filter(|m| *m == message).count();
        drop(seen);

        if attempts as u32 <= self.fail_first {
            return Err(RelayError::Handler(format!(
                "downstream rejected {} (attempt {attempts})",
                message.channel()
            )));
        }
        self.done
            .lock()
            .await
            .insert(format!("{}:{}", message.channel(), message.content()));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    published: usize,
    completed: usize,
    transported: usize,
    dead_lettered: usize,
    running_tasks_left: usize,
    elapsed_ms: u128,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    // (A) 設定
    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(secs) = args.interval_secs {
        config.staleness_interval_secs = secs;
    }

    // (B) ledger / transport と relay のワイヤリング
    let ledger = Arc::new(InMemoryLedger::new());
    let transport = Arc::new(InMemoryTransport::new());
    let relay = RelayBuilder::new(config)
        .ledger(ledger.clone())
        .transport(transport.clone())
        .build()
        .context("building relay")?;
    let period = relay.config().staleness_interval();

    // (C) listener と verifier を起動
    let downstream = Arc::new(FlakyDownstream::new(args.fail_first));
    let listener = Arc::new(relay.listener(downstream.clone()));
    let project_topic = relay.project_publisher().channel().clone();
    let routing_topic = relay.index_routing_publisher().channel().clone();
    let subscriptions = vec![
        transport.subscribe(&project_topic.wire_topic(ProjectPublisher::DELETE)),
        transport.subscribe(&project_topic.wire_topic(ProjectPublisher::CLOSE_AND_DELETE)),
        transport.subscribe(&routing_topic.wire_topic(IndexRoutingPublisher::CLOSE)),
    ];
    let listeners = ListenerGroup::spawn(listener, subscriptions);
    let scheduler = relay.scheduler(SweepGuard::new()).spawn();

    // (D) イベント投入
    let started = Instant::now();
    let projects = relay.project_publisher();
    let routes = relay.index_routing_publisher();
    let mut published = 0;
    for round in 0..args.rounds {
        if round % 2 == 0 {
            projects.delete(ProjectId::new()).await?;
        } else {
            projects.close_and_delete(ProjectId::new()).await?;
        }
        routes.close(IndexRouteId::new()).await?;
        published += 2;
    }
    info!(published, period_secs = period.as_secs(), "events published");

    // (E) 全件完了 / 上限 / Ctrl-C のいずれかまで待つ
    let deadline = started + period * args.max_periods;
    loop {
        let completed = downstream.completed().await;
        if completed >= published {
            break;
        }
        if Instant::now() >= deadline {
            warn!(completed, published, "gave up waiting for recovery");
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = sleep(Duration::from_millis(200)) => {}
        }
    }

    scheduler.shutdown_and_join().await;
    listeners.shutdown_and_join().await;

    let transported = transport.sent();
    let summary = Summary {
        published,
        completed: downstream.completed().await,
        transported: transported.len(),
        dead_lettered: transported
            .iter()
            .filter(|m| m.channel().ends_with("/dead-letter"))
            .count(),
        running_tasks_left: ledger
            .hash_get_all(relay.keys().running_tasks_key())
            .await?
            .len(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
