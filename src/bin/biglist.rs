// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Operator tool for a mailbox kept in a data directory.
//!
//! # Usage
//!
//! ```bash
//! biglist -d ./mail init --owner 7
//! biglist -d ./mail append --subject hello --body "hi there" --count 100
//! biglist -d ./mail rm "2-4, 10"
//! biglist -d ./mail expunge
//! biglist -d ./mail check
//! biglist -d ./mail repair -yyy
//! biglist -d ./fresh restore --from ./mail --placeholder "(body lost)"
//! ```
//!
//! The data directory holds `nodes/` and `bodies/` (one file per node) and
//! `mailbox.json`, the tree handle and staging state. The tool acts with
//! wizard rights.

use std::fs;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use biglist::FileStore;
use biglist::MailboxConfig;
use biglist::MessageSeq;
use biglist::Node;
use biglist::NodeStore;
use biglist::mail::Access;
use biglist::mail::Body;
use biglist::mail::Consent;
use biglist::mail::Incoming;
use biglist::mail::Mailbox;
use biglist::mail::MailboxState;
use biglist::mail::Message;
use biglist::mail::NeverYield;
use biglist::mail::Principal;
use biglist::mail::REQUIRED_CONFIRMATIONS;
use clap::ArgAction;
use clap::Parser;
use clap::Subcommand;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

type DiskMailbox = Mailbox<FileStore<Node<Message>>, FileStore<Body>>;

const STATE_FILE: &str = "mailbox.json";

/// Inspect and maintain a biglist mailbox
#[derive(Parser, Debug)]
#[command(name = "biglist", version, about = "Inspect and maintain a biglist mailbox")]
struct Args {
    /// Data directory of the mailbox
    #[arg(short = 'd', long, default_value = ".", env = "BIGLIST_DIR")]
    dir: PathBuf,

    /// Tree and quantum settings (TOML), used by `init`
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty mailbox
    Init {
        /// Owning principal
        #[arg(long, default_value_t = 1)]
        owner: u64,
    },
    /// Receive messages
    Append {
        #[arg(long, default_value = "")]
        subject: String,
        /// Body lines; the message has no body if none are given
        #[arg(long)]
        body: Vec<String>,
        /// How many copies to receive
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Print messages by rank
    List {
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long)]
        to: Option<u64>,
    },
    /// Report inconsistencies without changing anything
    Check,
    /// Print store counters and mailbox sizes as JSON
    Stats,
    /// Remove messages by rank, e.g. "2-4, 10"
    Rm { seq: MessageSeq },
    /// Put back every staged removal
    Undo,
    /// Commit staged removals and free their nodes
    Expunge,
    /// Make message numbers consecutive
    Renumber {
        #[arg(long, default_value_t = 1)]
        start: u64,
    },
    /// Rebuild the tree structure (irreversible)
    Repair {
        /// Confirm once; give three times to skip the prompts
        #[arg(short = 'y', long = "yes-i-am-sure", action = ArgAction::Count)]
        yes: u8,
    },
    /// Re-receive every message found in another data directory (irreversible)
    Restore {
        #[arg(long, value_name = "DIR")]
        from: PathBuf,
        /// Body given to messages whose body is lost
        #[arg(long, default_value = "(message body lost)")]
        placeholder: String,
        #[arg(short = 'y', long = "yes-i-am-sure", action = ArgAction::Count)]
        yes: u8,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("biglist=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("biglist=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Init { owner } => {
            let config = load_config(args.config.as_deref())?;
            return init(&args.dir, Principal(owner), config);
        }
        command => return maintain(&args.dir, command),
    }
}

fn maintain(dir: &Path, command: Command) -> Result<()> {
    let mut mailbox = open(dir)?;
    let access = Access::wizard(mailbox.owner());
    match command {
        Command::Init { .. } => bail!("{} already holds a mailbox", dir.display()),
        Command::Append { subject, body, count } => {
            let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
            let mut template = Incoming::new(timestamp).with_header("Subject", &subject);
            if !body.is_empty() {
                template = template.with_body(body);
            }
            let batch = vec![template; count as usize];
            let report = mailbox.receive_batch(&access, batch, &mut NeverYield)?;
            save(dir, &mailbox)?;
            println!(
                "received {} messages ({}-{})",
                report.received,
                report.first_number.unwrap_or_default(),
                report.last_number.unwrap_or_default()
            );
        }
        Command::List { from, to } => {
            let to = to.unwrap_or(mailbox.len()).min(mailbox.len());
            if from <= to {
                for (rank, message) in (from..).zip(mailbox.messages(from, to)?) {
                    println!(
                        "{rank:>6} #{:<6} {:>12} {}",
                        message.number,
                        message.timestamp,
                        message.header("subject").unwrap_or("")
                    );
                }
            }
        }
        Command::Check => {
            let problems = mailbox.verify()?;
            if problems.is_empty() {
                println!("ok: {} messages", mailbox.len());
                return Ok(());
            }
            for problem in &problems {
                println!("{problem}");
            }
            bail!("{} inconsistencies (run `biglist repair` to fix)", problems.len());
        }
        Command::Stats => {
            let stats = serde_json::json!({
                "messages": mailbox.len(),
                "height": mailbox.tree().height,
                "staged": mailbox.staged_count(),
                "kept": mailbox.messages_kept().count(),
                "reaping": mailbox.reaper().pending().len(),
                "nodes": mailbox.list().store().len(),
                "bodies": mailbox.bodies().len(),
                "store": mailbox.list().store().stats(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Rm { seq } => {
            let report = mailbox.rm_message_seq(&access, &seq, &mut NeverYield)?;
            save(dir, &mailbox)?;
            println!("removed {} messages", report.removed);
        }
        Command::Undo => {
            let restored = mailbox.undo_rmm(&access)?;
            save(dir, &mailbox)?;
            println!("restored {restored} messages");
        }
        Command::Expunge => {
            let expunged = mailbox.expunge_rmm(&access)?;
            save(dir, &mailbox)?;
            mailbox.reap_all()?;
            save(dir, &mailbox)?;
            println!("expunged {expunged} messages");
        }
        Command::Renumber { start } => {
            let report = mailbox.renumber(&access, start, &mut NeverYield)?;
            save(dir, &mailbox)?;
            println!("renumbered {} messages", report.renumbered);
        }
        Command::Repair { yes } => {
            let consent = collect_consent("repair the mailbox tree", yes)?;
            let report = mailbox.repair(&access, consent)?;
            save(dir, &mailbox)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Restore { from, placeholder, yes } => {
            let source = open_source(&from, mailbox.owner())?;
            let consent = collect_consent("restore messages into this mailbox", yes)?;
            let report = mailbox.restore_from(&access, consent, &source, &[placeholder])?;
            save(dir, &mailbox)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    return Ok(());
}

fn load_config(path: Option<&Path>) -> Result<MailboxConfig> {
    let Some(path) = path else {
        return Ok(MailboxConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    return MailboxConfig::from_toml(&text).with_context(|| format!("parsing {}", path.display()));
}

fn stores(dir: &Path) -> Result<(FileStore<Node<Message>>, FileStore<Body>)> {
    let nodes = FileStore::open(dir.join("nodes")).context("opening node store")?;
    let bodies = FileStore::open(dir.join("bodies")).context("opening body store")?;
    return Ok((nodes, bodies));
}

fn init(dir: &Path, owner: Principal, config: MailboxConfig) -> Result<()> {
    if dir.join(STATE_FILE).exists() {
        bail!("{} already holds a mailbox", dir.display());
    }
    let (nodes, bodies) = stores(dir)?;
    let mailbox = Mailbox::new(owner, config, nodes, bodies);
    save(dir, &mailbox)?;
    info!(dir = %dir.display(), %owner, "initialized mailbox");
    println!("initialized mailbox for {owner} in {}", dir.display());
    return Ok(());
}

fn open(dir: &Path) -> Result<DiskMailbox> {
    let path = dir.join(STATE_FILE);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading {} (run `biglist init` first)", path.display()))?;
    let state: MailboxState = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let (nodes, bodies) = stores(dir)?;
    return Ok(Mailbox::from_state(state, nodes, bodies));
}

/// A restore source only needs its stores; a damaged state file is fine.
fn open_source(dir: &Path, owner: Principal) -> Result<DiskMailbox> {
    match open(dir) {
        Ok(mailbox) => return Ok(mailbox),
        Err(e) => {
            warn!(error = %e, "source state unreadable, scanning stores only");
            let (nodes, bodies) = stores(dir)?;
            return Ok(Mailbox::new(owner, MailboxConfig::default(), nodes, bodies));
        }
    }
}

fn save(dir: &Path, mailbox: &DiskMailbox) -> Result<()> {
    let path = dir.join(STATE_FILE);
    let tmp = dir.join(format!("{STATE_FILE}.tmp"));
    let json = serde_json::to_string_pretty(&mailbox.state())?;
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
    return Ok(());
}

/// Confirmations from `--yes-i-am-sure` flags, topped up by asking on stdin.
fn collect_consent(action: &str, flags: u8) -> Result<Consent> {
    let mut consent = Consent::none();
    for _ in 0..flags.min(REQUIRED_CONFIRMATIONS) {
        consent = consent.confirm();
    }
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    while consent.given() < REQUIRED_CONFIRMATIONS {
        print!(
            "This will {action} and cannot be undone. Type 'yes' to confirm ({}/{}): ",
            consent.given() + 1,
            REQUIRED_CONFIRMATIONS
        );
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            bail!("not confirmed");
        };
        if line?.trim() != "yes" {
            bail!("not confirmed");
        }
        consent = consent.confirm();
    }
    return Ok(consent);
}
