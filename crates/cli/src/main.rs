use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use client::{build_ballot, PipelineConfig, SubmissionPipeline, SubmitError};
use crypto::Identity;
use ledger::{
    Clock, LedgerConfig, LedgerEvent, LedgerSnapshot, ManualClock, RoundConfig, SystemClock, VoteLedger,
    DEFAULT_TREE_DEPTH,
};
use rand::Rng;
use relay::RelayerPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zk::{FieldElement, Groth16Verifier, IdentitySecret, ProofVerifier, VoteKeys};

/// zkvote CLI - Anonymous relayed voting
#[derive(Parser)]
#[command(name = "zkvote")]
#[command(about = "Anonymous voting ledger with relayed, nullifier-protected ballots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete round in-process with real Groth16 proofs
    Simulate {
        /// Number of candidates
        #[arg(short, long, default_value_t = 3)]
        candidates: u32,

        /// Number of voters
        #[arg(short, long, default_value_t = 10)]
        voters: usize,

        /// Number of relayers
        #[arg(short, long, default_value_t = 3)]
        relayers: usize,

        /// Voting window length in seconds
        #[arg(short, long, default_value_t = 3600)]
        duration: u64,

        /// Commitment group tree depth
        #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
        tree_depth: u8,

        /// Write the final ledger snapshot here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Validate a ledger snapshot and print its contents
    Inspect {
        /// Snapshot file
        path: PathBuf,
    },

    /// Show a relayer principal
    RelayerId {
        /// 32-byte Ed25519 seed in hex (random if omitted)
        #[arg(long)]
        seed: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            candidates,
            voters,
            relayers,
            duration,
            tree_depth,
            snapshot,
        } => {
            simulate(candidates, voters, relayers, duration, tree_depth, snapshot.as_deref()).await?;
        }
        Commands::Inspect { path } => {
            inspect(&path)?;
        }
        Commands::RelayerId { seed } => {
            relayer_id(seed.as_deref())?;
        }
    }

    Ok(())
}

async fn simulate(
    candidates: u32,
    voters: usize,
    relayers: usize,
    duration: u64,
    tree_depth: u8,
    snapshot_path: Option<&Path>,
) -> anyhow::Result<()> {
    if relayers == 0 {
        bail!("at least one relayer is needed to submit votes");
    }

    println!("🔧 Running Groth16 setup for the demo circuit...");
    let keys = VoteKeys::setup(&mut rand::thread_rng())?;
    let verifier: Arc<dyn ProofVerifier> =
        Arc::new(Groth16Verifier::new().with_key(tree_depth, &keys.verifying_key));

    let admin = Identity::generate();
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let ledger = Arc::new(
        VoteLedger::new(admin.principal(), verifier.clone())
            .with_clock(clock.clone())
            .with_event_channel(event_tx),
    );

    let group_id = FieldElement::from_u64(rand::thread_rng().gen());
    let start = clock.now() + 1;
    let round = RoundConfig::new(group_id, start, start + duration, candidates)
        .with_tree_depth(tree_depth);
    ledger
        .initialize_round(&admin.principal(), round)
        .await
        .context("round initialization failed")?;
    println!("🗳️  Round {} with {} candidates", group_id, candidates);

    let pool = Arc::new(RelayerPool::new(ledger.clone()));
    for _ in 0..relayers {
        let principal = pool.register(&admin.principal(), Identity::generate()).await?;
        println!("🔄 Relayer {}", principal);
    }

    clock.set(start);

    println!("🔐 Proving {} ballots...", voters);
    let mut secrets = Vec::with_capacity(voters);
    let mut ballots = Vec::with_capacity(voters);
    {
        let mut rng = rand::thread_rng();
        for _ in 0..voters {
            let secret = IdentitySecret::random(&mut rng);
            let candidate = rng.gen_range(0..candidates);
            ballots.push(build_ballot(&keys, &secret, candidate, &round, &mut rng)?);
            secrets.push(secret);
        }
    }

    let pipeline = Arc::new(SubmissionPipeline::new(pool.clone(), verifier));
    let mut handles = Vec::with_capacity(ballots.len());
    for ballot in ballots {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.submit(ballot).await }));
    }

    let mut accepted = 0usize;
    for handle in handles {
        match handle.await? {
            Ok(_) => accepted += 1,
            Err(e) => println!("❌ Ballot rejected: {}", e),
        }
    }
    println!("✅ {} of {} ballots accepted", accepted, voters);

    // A voter trying again with another candidate, bypassing the local cache
    if let Some(secret) = secrets.first() {
        let candidate = (candidates > 1) as u32;
        let repeat = build_ballot(&keys, secret, candidate, &round, &mut rand::thread_rng())?;
        let direct = SubmissionPipeline::new(pool.clone(), Arc::new(zk::AcceptAll)).with_config(
            PipelineConfig {
                skip_prechecks: true,
                ..Default::default()
            },
        );
        match direct.submit(repeat).await {
            Err(SubmitError::Rejected(e)) => println!("🛑 Repeat vote rejected: {}", e),
            Err(e) => println!("🛑 Repeat vote failed: {}", e),
            Ok(_) => bail!("repeat vote was counted"),
        }
    }

    clock.set(round.end_time);
    println!("\n📊 Final tally (phase: {})", ledger.phase().await);
    for (candidate, count) in ledger.tally().await.iter().enumerate() {
        println!("   candidate {}: {}", candidate, count);
    }
    println!("   total: {}", ledger.total_votes().await);

    let stats = pool.stats().await;
    println!(
        "\n📡 Relays: {} dispatched, {} accepted, {} rejected",
        stats.dispatched, stats.accepted, stats.rejected
    );
    for (relayer, counters) in &stats.per_relayer {
        println!("   {}: {}", relayer.short_hex(), counters.accepted);
    }

    let mut cast = 0;
    while let Ok(event) = event_rx.try_recv() {
        if matches!(event, LedgerEvent::VoteCast(_)) {
            cast += 1;
        }
    }
    println!("📝 {} VoteCast events", cast);

    if let Some(path) = snapshot_path {
        let bytes = ledger.snapshot().await.to_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        println!("💾 Snapshot written to {}", path.display());
    }

    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot = LedgerSnapshot::from_bytes(&bytes).context("not a ledger snapshot")?;
    snapshot.validate(&LedgerConfig::default())?;

    println!("🆔 Admin: {}", snapshot.admin);
    match &snapshot.config {
        Some(round) => {
            println!("🗳️  Round {}", round.group_id);
            println!("   window: [{}, {})", round.start_time, round.end_time);
            println!("   candidates: {}", round.candidate_count);
            println!("   tree depth: {}", round.tree_depth);
        }
        None => println!("🗳️  No round configured"),
    }
    println!("⏸️  Paused: {}", snapshot.paused);

    println!("\n📊 Tally");
    for (candidate, count) in snapshot.tally.iter().enumerate() {
        println!("   candidate {}: {}", candidate, count);
    }
    println!("   total: {}", snapshot.total_votes);

    println!("\n🔄 Relayers ({})", snapshot.relayers.len());
    for relayer in &snapshot.relayers {
        println!("   {}", relayer);
    }

    Ok(())
}

fn relayer_id(seed: Option<&str>) -> anyhow::Result<()> {
    let identity = match seed {
        Some(hex_seed) => {
            let bytes = hex::decode(hex_seed.trim_start_matches("0x")).context("seed is not hex")?;
            let seed: [u8; 32] = bytes
                .try_into()
                .map_err(|b: Vec<u8>| anyhow::anyhow!("seed must be 32 bytes, got {}", b.len()))?;
            Identity::from_seed(seed)
        }
        None => Identity::generate(),
    };

    println!("🆔 Relayer principal: {}", identity.principal());
    println!("   (hex: {})", identity.principal().to_hex());
    Ok(())
}
