//! Developer CLI for AuthKit.
//!
//! `authkit flow` drives a flow against a live endpoint, prompting on
//! stdin for interactive states. `authkit session` simulates two sibling
//! tabs sharing one session and prints the lifecycle events as they fire.

use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use eyre::eyre;
use tracing_subscriber::EnvFilter;

use authkit_core::{
    Flow, FlowConfig, FlowContext, HandlerOutcome, HandlerTable, RunOptions,
    SessionRecord, State, StateName,
};
use authkit_session::{
    RecordProbe, RelayConfig, SchedulerConfig, SessionChannel, SessionProbe,
    SessionRelay,
};
use authkit_store::MemoryArea;

#[derive(Parser)]
#[command(name = "authkit", about = "AuthKit developer CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive an authentication flow against a live endpoint.
    Flow {
        /// Base URL of the flow API.
        #[arg(long, env = "AUTHKIT_API_URL")]
        api_url: String,

        /// Flow to drive.
        #[arg(long, default_value = "login")]
        flow: String,
    },
    /// Simulate two tabs sharing one session and watch lifecycle events.
    Session {
        /// Seconds until the simulated session expires.
        #[arg(long, default_value_t = 8)]
        expires_in: u64,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Flow { api_url, flow } => run_flow(&api_url, &flow).await,
        Command::Session { expires_in } => run_session(expires_in).await,
    }
}

async fn run_flow(api_url: &str, flow_name: &str) -> eyre::Result<()> {
    let ctx = FlowContext::builder(FlowConfig::new(api_url)).build();

    let handlers = HandlerTable::new()
        .on(StateName::LoginInit, |state: Arc<State>| async move {
            print_state(&state);
            let email = prompt("email> ");
            let mut values = authkit_core::InputValues::new();
            values.insert("email".to_string(), serde_json::Value::String(email));
            let next = state
                .get_action("continue_with_login_identifier")
                .run(Some(values), RunOptions::default())
                .await?;
            Ok(HandlerOutcome::State(next))
        })
        .on(StateName::Success, |state: Arc<State>| async move {
            print_state(&state);
            println!("flow completed");
            Ok(HandlerOutcome::Finish)
        })
        .on(StateName::Error, |state: Arc<State>| async move {
            print_state(&state);
            println!("flow failed");
            Ok(HandlerOutcome::Finish)
        });

    Flow::new(ctx)
        .init(flow_name, &handlers)
        .await
        .map_err(|err| eyre!("flow did not complete: {err}"))
}

async fn run_session(expires_in: u64) -> eyre::Result<()> {
    let area = MemoryArea::new();
    let channel = SessionChannel::new();
    let config = RelayConfig {
        scheduler: SchedulerConfig {
            initial_delay: Duration::from_millis(500),
            interval: Duration::from_secs(1),
            expiry_cutoff: Duration::from_secs(3),
        },
        throttle_window: Duration::from_millis(500),
    };

    let tab_a = SessionRelay::new(Arc::new(area.handle()), &channel, config);
    let tab_b = SessionRelay::new(Arc::new(area.handle()), &channel, config);

    let _sub_a = tab_a.subscribe(|event| println!("[tab a] {event:?}"));
    let _sub_b = tab_b.subscribe(|event| println!("[tab b] {event:?}"));

    let probe = Arc::new(RecordProbe::new(Arc::new(area.handle())));
    tab_a.start(Arc::clone(&probe) as Arc<dyn SessionProbe>);
    tab_b.start(probe);

    let record = SessionRecord::expiring_in("demo-user", expires_in, true);
    tab_a.announce_created(&record)?;
    println!("session announced, expiring in {expires_in}s");

    tokio::time::sleep(Duration::from_secs(expires_in + 2)).await;
    tab_a.stop();
    tab_b.stop();
    Ok(())
}

fn print_state(state: &Arc<State>) {
    println!("state: {}", state.name());
    if let Some(payload) = state.payload() {
        println!("payload: {payload}");
    }
    if let Some(error) = state.error() {
        println!("error: {} {}", error.code, error.message.as_deref().unwrap_or(""));
    }
    let actions: Vec<&str> = state.action_names().collect();
    println!("actions: {}", actions.join(", "));
}

fn prompt(label: &str) -> String {
    print!("{label}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
    line.trim().to_string()
}
