//! Mockview console: rehearse an interview session from the terminal.
//!
//! Usage:
//!   cargo run -p mockview-session -- [--identity NAME] [--offline]
//!
//! The real-time leg is the in-process loopback; you play the agent by typing
//! `stage experience` or `complete`. Credentials come from the configured token
//! endpoint unless `--offline` is given.

use mockview_session::{
    loopback, HttpTokenIssuer, InterviewConfig, InterviewOrchestrator, SessionConnector,
    SessionNotice, StaticTokenIssuer, TokenIssuer, TrackKind,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
commands:
  start              start the interview
  end                end the call
  status             show stage, countdown, status
  stage <name>       agent: stage_changed (intro | experience)
  complete           agent: interview_complete
  audio              agent: publish an audio track
  data <payload>     agent: raw data-channel payload
  drop               simulate a dropped connection
  quit               shut down";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[mockview] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let mut identity = "demo".to_string();
    let mut offline = false;
    while let Some(a) = args.next() {
        match a.as_str() {
            "--identity" => {
                if let Some(name) = args.next() {
                    identity = name;
                }
            }
            "--offline" => offline = true,
            "--help" | "-h" => {
                eprintln!("mockview: interview session console");
                eprintln!("  --identity NAME   participant identity (default: demo)");
                eprintln!("  --offline         skip the token endpoint, use a static token");
                eprintln!();
                eprintln!("{}", HELP);
                return Ok(());
            }
            other => eprintln!("[mockview] ignoring unknown argument {}", other),
        }
    }

    let config = InterviewConfig::load()?;
    info!(
        token_endpoint = %config.token_endpoint,
        intro_secs = config.stages.intro_secs,
        experience_secs = config.stages.experience_secs,
        offline,
        "mockview starting"
    );

    let issuer: Arc<dyn TokenIssuer> = if offline {
        Arc::new(StaticTokenIssuer::new("offline-token"))
    } else {
        Arc::new(HttpTokenIssuer::from_config(&config)?)
    };
    let (transport, media, agent) = loopback();
    let connector = SessionConnector::new(&config, issuer, Arc::new(transport), Arc::new(media));
    let (handle, mut notices) = InterviewOrchestrator::spawn(config, connector);

    let mut watch = handle.watch();
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                SessionNotice::SessionStarted { room, .. } => println!("● LIVE  room {}", room),
                SessionNotice::StageEntered { stage, .. } => println!("→ {}", stage.label()),
                SessionNotice::RemoteAudioAvailable { participant_id, .. } => {
                    println!("♪ agent audio from {}", participant_id)
                }
                SessionNotice::SetupFailed { error, .. } => {
                    println!("✗ failed to connect: {}", error)
                }
                SessionNotice::Completed { reason, .. } => {
                    println!("✓ session ended ({:?})", reason)
                }
                SessionNotice::ClockArmed { .. } => {}
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut parts = line.trim().splitn(2, ' ');
                match (parts.next().unwrap_or(""), parts.next()) {
                    ("start", _) => handle.start(identity.clone())?,
                    ("end", _) => handle.end_call()?,
                    ("status", _) => println!("{}", handle.snapshot().render_line()),
                    ("stage", Some(name)) => report(agent.send_stage_changed(name.trim())),
                    ("complete", _) => report(agent.send_interview_complete()),
                    ("audio", _) => {
                        report(agent.subscribe_track("TR_agent", TrackKind::Audio, "agent"))
                    }
                    ("data", Some(payload)) => {
                        report(agent.send_data(payload.as_bytes().to_vec()))
                    }
                    ("drop", _) => report(agent.drop_connection("simulated network loss")),
                    ("quit", _) | ("exit", _) => break,
                    ("", _) => {}
                    _ => println!("{}", HELP),
                }
            }
            changed = watch.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = watch.borrow_and_update().clone();
                if snapshot.status.is_active() {
                    println!("{}", snapshot.render_line());
                }
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

fn report(delivered: bool) {
    if !delivered {
        println!("(not connected)");
    }
}
