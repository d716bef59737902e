//! CLI entrypoint for ideastorm
//!
//! Wires the layers together with dependency injection and drives one local
//! workshop session end to end, printing the ordered event stream as every
//! connected client would see it. The AI backend is taken from the
//! configured gateway endpoint; when it is unreachable the run demonstrates
//! graceful degradation instead of failing.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storm_application::{
    ArtifactBroker, BroadcastHub, FacilitationPipeline, IdentityVerifier, PresenceTracker,
    SessionArchive, SessionOrchestrator, SessionStateStore, VerifiedIdentity,
};
use storm_domain::{ConnectionId, EventKind, ParticipantId, Role, SessionEvent};
use storm_infrastructure::{
    ConfigLoader, HttpArtifactGateway, JsonlSessionArchive, RosterIdentityVerifier,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ideastorm", about = "Workshop session orchestrator demo driver")]
struct Cli {
    /// Path to a config file (overrides discovered configs)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress the event printout, log only
    #[arg(short, long)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // keep the appender guard alive for the whole run
    let _guard = match &cli.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().context("log file path has no file name")?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    };

    info!("Starting ideastorm");
    let config = ConfigLoader::load(cli.config.as_ref()).map_err(|err| anyhow::anyhow!(err))?;

    // === Dependency Injection ===
    let store = Arc::new(SessionStateStore::new());
    let hub = Arc::new(BroadcastHub::new(config.broadcast.backlog_policy()));
    let presence = Arc::new(PresenceTracker::new(config.presence.presence_policy()));
    let gateway = Arc::new(
        HttpArtifactGateway::new(&config.gateway)
            .map_err(|err| anyhow::anyhow!("gateway setup failed: {err}"))?,
    );
    let broker = Arc::new(ArtifactBroker::new(gateway, config.gateway.retry_policy()));
    let pipeline = FacilitationPipeline::new(Arc::clone(&store), Arc::clone(&hub), broker);
    let roster = Arc::new(RosterIdentityVerifier::new());
    let archive = Arc::new(
        JsonlSessionArchive::open(&config.archive.path)
            .with_context(|| format!("cannot open archive at {}", config.archive.path))?,
    );
    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&presence),
        pipeline,
        Arc::clone(&roster) as Arc<dyn IdentityVerifier>,
        Arc::clone(&archive) as Arc<dyn SessionArchive>,
    )
    .with_max_vote_weight(config.voting.max_weight);

    let sweeper_cancel = CancellationToken::new();
    tokio::spawn(orchestrator.clone().run_presence_sweeper(sweeper_cancel.clone()));

    // === One local workshop, driven end to end ===
    let session = orchestrator.create_session(
        VerifiedIdentity::new(ParticipantId::new("dana"), "Dana", Role::Organizer),
        "Improving our release process",
        Some("Find three changes we commit to this quarter".to_string()),
        config.voting.quorum_policy(),
    )?;
    roster.enroll(
        session.clone(),
        "tok-dana",
        VerifiedIdentity::new(ParticipantId::new("dana"), "Dana", Role::Organizer),
    );
    roster.enroll(
        session.clone(),
        "tok-alice",
        VerifiedIdentity::new(ParticipantId::new("alice"), "Alice", Role::Member),
    );
    roster.enroll(
        session.clone(),
        "tok-bob",
        VerifiedIdentity::new(ParticipantId::new("bob"), "Bob", Role::Member),
    );

    let dana = ConnectionId::new("conn-dana");
    let alice = ConnectionId::new("conn-alice");
    let bob = ConnectionId::new("conn-bob");

    let accept = orchestrator.join(&session, dana.clone(), "tok-dana", None).await?;
    let printer = if cli.quiet {
        None
    } else {
        let mut stream = accept.stream;
        Some(tokio::spawn(async move {
            while let Ok(Some(event)) = stream.next().await {
                println!("{}", render_event(&event));
            }
        }))
    };

    orchestrator.join(&session, alice.clone(), "tok-alice", None).await?;
    orchestrator.join(&session, bob.clone(), "tok-bob", None).await?;

    orchestrator
        .send_chat(&session, &dana, "Welcome everyone, let's get started.")
        .await?;

    // give the agenda generation a moment to land (or degrade)
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut stage_index = 0;
    for _ in 0..3 {
        orchestrator.advance_stage(&session, &dana, stage_index).await?;
        stage_index += 1;
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let idea_releases = orchestrator
        .submit_idea(&session, &alice, "Automate the release checklist")
        .await?;
    let idea_reviews = orchestrator
        .submit_idea(&session, &bob, "Rotate a weekly review captain")
        .await?;
    orchestrator
        .send_chat(&session, &bob, "Both of these bit us last sprint.")
        .await?;

    // into voting
    orchestrator.advance_stage(&session, &dana, stage_index).await?;
    orchestrator
        .cast_vote(&session, &alice, &idea_releases.id, None)
        .await?;
    orchestrator
        .cast_vote(&session, &bob, &idea_reviews.id, Some(2))
        .await?;
    // dana's vote completes coverage and auto-advances to prioritization
    orchestrator
        .cast_vote(&session, &dana, &idea_releases.id, None)
        .await?;

    if !cli.quiet {
        println!("--- final ranking ---");
        for ranked in orchestrator.tally(&session).await? {
            println!(
                "  #{} [{} votes] {}",
                ranked.rank, ranked.total_weight, ranked.idea.content
            );
        }
    }

    // prioritization -> report, then wrap up
    orchestrator.advance_stage(&session, &dana, 5).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    orchestrator.conclude(&session, &dana).await?;

    if let Some(printer) = printer {
        let _ = printer.await;
    }
    sweeper_cancel.cancel();
    info!("session archived to {}", archive.path().display());
    Ok(())
}

fn render_event(event: &SessionEvent) -> String {
    let body = match &event.kind {
        EventKind::ParticipantJoined {
            display_name, role, ..
        } => format!("{display_name} joined ({role:?})"),
        EventKind::ParticipantLeft { participant } => format!("{participant} left"),
        EventKind::ChatPosted { message } => {
            format!("chat <{}> {}", message.sender, message.content)
        }
        EventKind::IdeaSubmitted { author, content, .. } => {
            format!("idea from {author}: {content}")
        }
        EventKind::VoteCast {
            participant,
            weight,
            ..
        } => format!("vote by {participant} (weight {weight})"),
        EventKind::StageAdvanced { stage, status } => {
            format!("stage -> {stage} ({status:?})")
        }
        EventKind::ArtifactGenerated { artifact } => {
            let origin = if artifact.fallback { "fallback" } else { "generated" };
            format!("{} {}: {}", origin, artifact.kind, first_line(&artifact.content))
        }
        EventKind::ArtifactFailed {
            artifact_kind,
            reason,
            degraded,
        } => format!(
            "artifact {artifact_kind} failed ({reason}){}",
            if *degraded { " - degraded" } else { "" }
        ),
        EventKind::SessionConcluded => "session concluded".to_string(),
    };
    format!("[{:>4}] {body}", event.sequence)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
