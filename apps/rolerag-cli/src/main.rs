use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rolerag_core::config::{Config, Settings};
use rolerag_core::types::Answer;
use rolerag_core::{AccessPolicy, DocumentLoader, Error};
use rolerag_pipeline::{ContextCell, LoadOutcome, RagContext, Session};

#[derive(Parser)]
#[command(name = "rolerag", version, about = "Role-gated question answering over a partitioned document store")]
struct Cli {
    /// Directory holding config.toml.
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the role to partition table.
    Roles,
    /// Load and index every document the role may read.
    Ingest {
        #[arg(long)]
        role: String,
        /// Overrides data.documents_dir.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Answer one question, ingesting first if the role's collection is empty.
    Ask {
        #[arg(long)]
        role: String,
        question: String,
    },
    /// Interactive session. `:role <name>` switches role, `:quit` exits.
    Chat {
        #[arg(long)]
        role: String,
    },
}

const NO_ACCESS: u8 = 2;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

/// How a command ended. `NoAccess` maps to exit code 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    NoAccess,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Roles => "roles",
            Command::Ingest { .. } => "ingest",
            Command::Ask { .. } => "ask",
            Command::Chat { .. } => "chat",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config_dir).map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let base = std::env::current_dir()?;
    let services = ContextCell::new();

    match run(cli.command, &settings, &base, &services).await? {
        Outcome::Done => Ok(ExitCode::SUCCESS),
        Outcome::NoAccess => Ok(ExitCode::from(NO_ACCESS)),
    }
}

/// The access policy is consulted before any service is started, so a
/// refused role is reported the same way whether or not the services could
/// come up.
async fn run(command: Command, settings: &Settings, base: &Path, services: &ContextCell) -> anyhow::Result<Outcome> {
    let policy = AccessPolicy::standard();
    info!(command = command.name(), "starting");

    match command {
        Command::Roles => {
            for (role, partitions) in policy.entries() {
                let names: Vec<&str> = partitions.iter().map(|p| p.as_str()).collect();
                println!("{role:<12} {}", names.join(", "));
            }
        }
        Command::Ingest { role, data_dir } => {
            if !authorized(&policy, &role) {
                return Ok(Outcome::NoAccess);
            }
            let docs = data_dir.unwrap_or_else(|| settings.documents_dir(base));
            let ctx = context(services, settings, base).await?;
            let mut session = Session::new(ctx, policy, loader(settings, &docs))?;
            select(&mut session, &role);
            ingest(&mut session).await?;
        }
        Command::Ask { role, question } => {
            if !authorized(&policy, &role) {
                return Ok(Outcome::NoAccess);
            }
            let ctx = context(services, settings, base).await?;
            let docs = settings.documents_dir(base);
            let mut session = Session::new(ctx, policy, loader(settings, &docs))?;
            select(&mut session, &role);
            if let Some(answer) = ask(&mut session, &question).await? {
                print_answer(&answer);
            }
        }
        Command::Chat { role } => {
            if !authorized(&policy, &role) {
                return Ok(Outcome::NoAccess);
            }
            let ctx = context(services, settings, base).await?;
            let docs = settings.documents_dir(base);
            let mut session = Session::new(ctx, policy, loader(settings, &docs))?;
            select(&mut session, &role);
            chat(&mut session).await?;
        }
    }
    Ok(Outcome::Done)
}

/// False when the role has no access; the refusal is already printed.
fn authorized(policy: &AccessPolicy, role: &str) -> bool {
    match policy.authorize(role) {
        Ok(_) => true,
        Err(e) => {
            warn!(role, "access refused");
            eprintln!("no access: {e}");
            println!("no documents found");
            false
        }
    }
}

async fn context(services: &ContextCell, settings: &Settings, base: &Path) -> anyhow::Result<RagContext> {
    let ctx = services
        .get_or_init(|| RagContext::from_settings(settings.clone(), base))
        .await
        .context("failed to start services")?;
    Ok(ctx.clone())
}

fn loader(settings: &Settings, docs: &Path) -> DocumentLoader {
    DocumentLoader::new(docs).with_extensions(settings.data.supported_extensions.iter())
}

/// False when the role has no access; the reason is already printed.
fn select(session: &mut Session, role: &str) -> bool {
    match session.select_role(role) {
        Ok(partitions) => {
            let names: Vec<&str> = partitions.iter().map(|p| p.as_str()).collect();
            println!("Role '{}' can read: {}", role.trim().to_lowercase(), names.join(", "));
            true
        }
        Err(e) => {
            warn!(role, "access refused");
            eprintln!("no access: {e}");
            println!("no documents found");
            false
        }
    }
}

/// Returns false when nothing was found to index.
async fn ingest(session: &mut Session) -> anyhow::Result<bool> {
    match session.load_and_index().await? {
        LoadOutcome::NoDocuments { failures } => {
            warn!(failures = failures.len(), "no documents found for role");
            println!("no documents found for this role");
            for f in failures {
                println!("  skipped {}: {}", f.path.display(), f.reason);
            }
            Ok(false)
        }
        LoadOutcome::Indexed { documents, chunks, report, failures } => {
            info!(documents, chunks, written = report.written, skipped = report.skipped, "ingest finished");
            println!(
                "✅ Indexed {documents} documents ({chunks} chunks, {} written, {} already present)",
                report.written, report.skipped
            );
            for f in failures {
                println!("⚠️  skipped {}: {}", f.path.display(), f.reason);
            }
            Ok(true)
        }
        LoadOutcome::AlreadyIndexed => Ok(true),
    }
}

/// `None` when the role's partitions hold nothing to answer from.
async fn ask(session: &mut Session, question: &str) -> anyhow::Result<Option<Answer>> {
    match session.ask(question).await {
        Ok(answer) => Ok(Some(answer)),
        Err(Error::QueryPrecondition) => {
            if !ingest(session).await? {
                return Ok(None);
            }
            Ok(Some(session.ask(question).await?))
        }
        Err(e) if e.is_retryable() => Err(anyhow::Error::new(e).context("generation service unavailable, try again")),
        Err(e) => Err(e.into()),
    }
}

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.text);
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for s in &answer.sources {
            println!("  - {s}");
        }
    }
    if !answer.unverified_sources.is_empty() {
        println!("\nCited but not retrieved:");
        for s in &answer.unverified_sources {
            println!("  - {s}");
        }
    }
}

async fn chat(session: &mut Session) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" {
            break;
        }
        if let Some(role) = line.strip_prefix(":role") {
            session.change_role();
            select(session, role);
            continue;
        }
        if session.role().is_none() {
            println!("select a role first with :role <name>");
            continue;
        }
        match ask(session, line).await {
            Ok(Some(answer)) => print_answer(&answer),
            Ok(None) => {}
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}
