//! CLI entry point for `chatsweep`.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use chatsweep::bridge::{ActionKind, ConversationBridge, LogBridge};
use chatsweep::decode::{chat_text, classify, extract_attachments};
use chatsweep::download::{build_output_path, media_hash};
use chatsweep::model::{ContentType, RawMessage};
use chatsweep::query::{ConversationQuery, Direction};
use chatsweep::store::{FileLog, MessageLog};
use chatsweep::task::{BulkTask, Constraint, TaskContext, TaskEvent, TaskState};

#[derive(Parser)]
#[command(name = "chatsweep", version)]
#[command(about = "Decode, classify and batch-process conversation messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations in a message log
    Conversations { log: PathBuf },
    /// Page through a conversation's decoded messages
    History {
        log: PathBuf,
        /// Conversation id to read
        #[arg(short, long)]
        conversation: String,
        /// Only chat messages whose text contains this (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
        /// Newest messages first
        #[arg(long)]
        reverse: bool,
        /// Messages per fetched page
        #[arg(long, default_value_t = 30)]
        page_size: usize,
        /// Stop after this many messages (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// List attachment descriptors for a conversation
    Attachments {
        log: PathBuf,
        #[arg(short, long)]
        conversation: String,
        /// Root directory used when suggesting output paths
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show per-conversation statistics
    Stats {
        log: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Apply a bulk action to matching messages in a conversation
    Sweep {
        log: PathBuf,
        #[arg(short, long)]
        conversation: String,
        /// Action applied to each matching message
        #[arg(short, long, value_enum)]
        action: CliAction,
        /// Restrict to these payload categories (chat, snap, note,
        /// sticker, external_media); repeatable
        #[arg(long = "content-type", value_delimiter = ',')]
        content_types: Vec<String>,
        /// Only messages from this sender id
        #[arg(long)]
        sender: Option<Uuid>,
        /// Exclude messages from this sender id
        #[arg(long)]
        not_sender: Option<Uuid>,
        /// The operator's own account id (enables --mine / --not-mine)
        #[arg(long)]
        self_id: Option<Uuid>,
        /// Only the operator's own messages (requires --self-id)
        #[arg(long, conflicts_with = "not_mine")]
        mine: bool,
        /// Everyone's messages but the operator's (requires --self-id)
        #[arg(long)]
        not_mine: bool,
        /// Only chat messages containing this text (evaluated last)
        #[arg(long = "match")]
        match_text: Option<String>,
        /// Explicit client message ids; bounds the run and shows a
        /// determinate progress bar
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        /// Messages fetched per scan page
        #[arg(long)]
        page_size: Option<usize>,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliAction {
    Save,
    Unsave,
    Read,
    Delete,
}

impl From<CliAction> for ActionKind {
    fn from(action: CliAction) -> Self {
        match action {
            CliAction::Save => ActionKind::Save,
            CliAction::Unsave => ActionKind::Unsave,
            CliAction::Read => ActionKind::Read,
            CliAction::Delete => ActionKind::Delete,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = chatsweep::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Conversations { log } => cmd_conversations(&log).await,
        Commands::History {
            log,
            conversation,
            filter,
            reverse,
            page_size,
            limit,
        } => cmd_history(&log, &conversation, filter, reverse, page_size, limit).await,
        Commands::Attachments {
            log,
            conversation,
            output,
            json,
        } => cmd_attachments(&log, &conversation, &output, json).await,
        Commands::Stats { log, json } => cmd_stats(&log, json).await,
        Commands::Sweep {
            log,
            conversation,
            action,
            content_types,
            sender,
            not_sender,
            self_id,
            mine,
            not_mine,
            match_text,
            ids,
            page_size,
            yes,
        } => {
            cmd_sweep(SweepArgs {
                log,
                conversation,
                action: action.into(),
                content_types,
                sender,
                not_sender,
                self_id,
                mine,
                not_mine,
                match_text,
                ids,
                page_size: page_size.unwrap_or(config.task.page_size),
                action_delay_ms: config.task.action_delay_ms,
                system_sender_ids: config.filters.system_sender_ids.clone(),
                yes,
            })
            .await
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &chatsweep::config::Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = chatsweep::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "chatsweep.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "chatsweep", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// List conversation ids with record counts.
async fn cmd_conversations(log_path: &Path) -> anyhow::Result<()> {
    let log = Arc::new(FileLog::open(log_path)?);
    let ids = log.conversation_ids().await?;
    if ids.is_empty() {
        println!("  No conversations logged.");
        return Ok(());
    }

    println!();
    println!("  {:<40} {:>9}", "Conversation", "Messages");
    println!("  {}", "-".repeat(50));
    for id in ids {
        let mut query =
            ConversationQuery::over_log(log.clone(), id.clone(), Direction::OldestFirst)
                .with_page_size(500);
        let mut count = 0usize;
        loop {
            let page = query.next_page().await?;
            if page.is_empty() {
                break;
            }
            count += page.len();
        }
        println!("  {id:<40} {count:>9}");
    }
    println!();
    Ok(())
}

/// Page through one conversation, decoding as we go.
async fn cmd_history(
    log_path: &Path,
    conversation: &str,
    filter: Option<String>,
    reverse: bool,
    page_size: usize,
    limit: usize,
) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let log = Arc::new(FileLog::open(log_path)?);
    let direction = if reverse {
        Direction::NewestFirst
    } else {
        Direction::OldestFirst
    };

    let mut query = ConversationQuery::over_log(log, conversation, direction)
        .with_page_size(page_size.max(1));
    if let Some(needle) = filter {
        let needle = needle.to_lowercase();
        query = query.filter(move |m| {
            Ok(chat_text(&m.reader())
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false))
        });
    }

    println!();
    println!(
        "  {:<6} {:<17} {:<10} {:<14} {:<44} {:>8}",
        "Id", "Date", "Sender", "Category", "Content", "Size"
    );
    println!("  {}", "-".repeat(102));

    let mut shown = 0usize;
    'pages: loop {
        let page = query.next_page().await?;
        if page.is_empty() {
            break;
        }
        for message in &page {
            print_history_row(message, format_size(message.content.len() as u64, BINARY));
            shown += 1;
            if limit > 0 && shown >= limit {
                break 'pages;
            }
        }
    }
    println!();
    println!("  {shown} message(s)");
    println!();
    Ok(())
}

fn print_history_row(message: &RawMessage, size: String) {
    let reader = message.reader();
    let category = classify(&reader);
    let content = match category {
        ContentType::Chat => chat_text(&reader).unwrap_or_else(|| "[empty message]".to_string()),
        _ => {
            let attachments = extract_attachments(&reader);
            if attachments.is_empty() {
                format!("[{category}]")
            } else {
                format!("[{category}: {} attachment(s)]", attachments.len())
            }
        }
    };
    let content_trunc: String = content.chars().take(43).collect();
    let sender = message
        .sender_id
        .map(|id| id.to_string().chars().take(8).collect())
        .unwrap_or_else(|| "-".to_string());
    let date = message
        .sent_at()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "  {:<6} {:<17} {:<10} {:<14} {:<44} {:>8}",
        message.client_message_id,
        date,
        sender,
        category.to_string(),
        content_trunc,
        size
    );
}

/// List attachment descriptors with suggested download paths.
async fn cmd_attachments(
    log_path: &Path,
    conversation: &str,
    output: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let log = Arc::new(FileLog::open(log_path)?);
    let mut query = ConversationQuery::over_log(log.clone(), conversation, Direction::OldestFirst)
        .with_page_size(200);

    let mut items = Vec::new();
    loop {
        let page = query.next_page().await?;
        if page.is_empty() {
            break;
        }
        for message in &page {
            for descriptor in log
                .attachments(conversation, message.client_message_id)
                .await?
            {
                let hash = media_hash(descriptor.media_id());
                let path = build_output_path(output, &descriptor, &hash, message.timestamp);
                items.push((message.client_message_id, descriptor, hash, path));
            }
        }
    }

    if json {
        let values: Vec<serde_json::Value> = items
            .iter()
            .map(|(message_id, descriptor, hash, path)| {
                serde_json::json!({
                    "client_message_id": message_id,
                    "media_id": descriptor.media_id(),
                    "media_type": descriptor.media_type.to_string(),
                    "media_hash": hash,
                    "output_path": path.to_string_lossy(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("  No attachments found.");
        return Ok(());
    }
    println!();
    println!("  {:<6} {:<8} {:<34} {}", "Msg", "Type", "Hash", "Output path");
    println!("  {}", "-".repeat(100));
    for (message_id, descriptor, hash, path) in &items {
        println!(
            "  {:<6} {:<8} {:<34} {}",
            message_id,
            descriptor.media_type.to_string(),
            hash,
            path.display()
        );
    }
    println!();
    println!("  {} attachment(s)", items.len());
    println!();
    Ok(())
}

/// Per-conversation category counts and payload sizes.
async fn cmd_stats(log_path: &Path, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let log = Arc::new(FileLog::open(log_path)?);
    let mut rows = Vec::new();

    for conversation in log.conversation_ids().await? {
        let mut query =
            ConversationQuery::over_log(log.clone(), conversation.clone(), Direction::OldestFirst)
                .with_page_size(500);
        let mut categories: HashMap<ContentType, usize> = HashMap::new();
        let mut total = 0usize;
        let mut bytes = 0u64;
        loop {
            let page = query.next_page().await?;
            if page.is_empty() {
                break;
            }
            for message in &page {
                *categories.entry(classify(&message.reader())).or_default() += 1;
                total += 1;
                bytes += message.content.len() as u64;
            }
        }
        rows.push((conversation, total, bytes, categories));
    }

    if json {
        let values: Vec<serde_json::Value> = rows
            .iter()
            .map(|(conversation, total, bytes, categories)| {
                let by_category: HashMap<String, usize> = categories
                    .iter()
                    .map(|(ct, n)| (ct.to_string(), *n))
                    .collect();
                serde_json::json!({
                    "conversation": conversation,
                    "messages": total,
                    "payload_bytes": bytes,
                    "by_category": by_category,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    println!();
    for (conversation, total, bytes, categories) in &rows {
        println!("  {conversation}");
        println!("    {:<20} {}", "Messages", total);
        println!("    {:<20} {}", "Payload", format_size(*bytes, BINARY));
        let mut sorted: Vec<(&ContentType, &usize)> = categories.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1));
        for (category, count) in sorted {
            println!("    {:<20} {}", category.to_string(), count);
        }
        println!();
    }
    Ok(())
}

struct SweepArgs {
    log: PathBuf,
    conversation: String,
    action: ActionKind,
    content_types: Vec<String>,
    sender: Option<Uuid>,
    not_sender: Option<Uuid>,
    self_id: Option<Uuid>,
    mine: bool,
    not_mine: bool,
    match_text: Option<String>,
    ids: Vec<i64>,
    page_size: usize,
    action_delay_ms: Option<[u64; 2]>,
    system_sender_ids: std::collections::HashSet<Uuid>,
    yes: bool,
}

/// Run a bulk action against the logged conversation.
async fn cmd_sweep(args: SweepArgs) -> anyhow::Result<()> {
    let log = Arc::new(FileLog::open(&args.log)?);
    let bridge: Arc<dyn ConversationBridge> = Arc::new(LogBridge::new(log));

    let constraints = build_constraints(&args)?;
    if !args.yes && !confirm_sweep(&args)? {
        println!("  Aborted.");
        return Ok(());
    }

    let context = TaskContext {
        my_user_id: args.self_id,
        system_sender_ids: args.system_sender_ids.clone(),
    };

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut task = BulkTask::new(bridge, args.conversation.clone(), args.action)
        .with_constraints(constraints)
        .with_context(context)
        .with_page_size(args.page_size)
        .with_events(events_tx);
    if !args.ids.is_empty() {
        task = task.with_explicit_ids(args.ids.clone());
    }
    if let Some(bounds) = args.action_delay_ms {
        task = task.with_action_delay(bounds);
    }

    let cancel = task.cancellation_token();
    let ctrlc_cancel = cancel.clone();
    let ctrlc = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("  Cancelling after the current message...");
            ctrlc_cancel.cancel();
        }
    });

    let runner = tokio::spawn(task.run());

    // Determinate bar for a bounded goal, spinner for a full scan
    let mut bar: Option<ProgressBar> = None;
    while let Some(event) = events_rx.recv().await {
        match event {
            TaskEvent::Started { goal } => {
                let pb = match goal {
                    Some(goal) => {
                        let pb = ProgressBar::new(goal as u64);
                        pb.set_style(
                            ProgressStyle::default_bar()
                                .template(&format!(
                                    "{{spinner:.green}} {} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}",
                                    args.action
                                ))
                                .expect("valid template")
                                .progress_chars("#>-"),
                        );
                        pb
                    }
                    None => {
                        let pb = ProgressBar::new_spinner();
                        pb.set_style(
                            ProgressStyle::default_spinner()
                                .template("{spinner:.green} {msg}")
                                .expect("valid template"),
                        );
                        pb
                    }
                };
                bar = Some(pb);
            }
            TaskEvent::Processed { processed, .. } => {
                if let Some(pb) = &bar {
                    if pb.length().is_some() {
                        pb.set_position(processed as u64);
                    } else {
                        pb.set_message(format!("{processed} message(s) processed"));
                        pb.tick();
                    }
                }
            }
            TaskEvent::MessageFailed {
                client_message_id,
                reason,
            } => {
                if let Some(pb) = &bar {
                    pb.println(format!("  message {client_message_id}: {reason}"));
                }
            }
            TaskEvent::Finished { .. } => break,
        }
    }
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }

    let outcome = runner.await?;
    ctrlc.abort();

    let verdict = match outcome.state {
        TaskState::Completed => "completed",
        TaskState::Cancelled => "cancelled",
        TaskState::Failed => "FAILED",
        _ => unreachable!("run() only returns terminal states"),
    };
    println!();
    println!(
        "  Sweep {verdict}: {} message(s) processed ({})",
        outcome.processed, args.action
    );
    println!();
    if outcome.state == TaskState::Failed {
        anyhow::bail!("sweep did not run to completion");
    }
    Ok(())
}

/// Translate CLI flags into the ordered constraint list, cheapest first.
fn build_constraints(args: &SweepArgs) -> anyhow::Result<Vec<Constraint>> {
    let mut constraints = Vec::new();

    if let Some(sender) = args.sender {
        constraints.push(Constraint::from_sender(sender));
    }
    if let Some(sender) = args.not_sender {
        constraints.push(Constraint::not_from_sender(sender));
    }
    if args.mine || args.not_mine {
        if args.self_id.is_none() {
            anyhow::bail!("--mine/--not-mine require --self-id");
        }
        constraints.push(if args.mine {
            Constraint::own_messages()
        } else {
            Constraint::not_own_messages()
        });
    }
    if !args.system_sender_ids.is_empty() {
        constraints.push(Constraint::not_system_sender());
    }
    // Deleting an already-deleted record is a wasted remote call
    if args.action == ActionKind::Delete {
        constraints.push(Constraint::not_terminal());
    }
    if !args.content_types.is_empty() {
        let mut types = Vec::new();
        for name in &args.content_types {
            let ct: ContentType = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            types.push(ct);
        }
        constraints.push(Constraint::content_types(&types));
    }
    // Full decode: always last
    if let Some(needle) = &args.match_text {
        constraints.push(Constraint::chat_contains(needle.clone()));
    }
    Ok(constraints)
}

/// Ask before acting. Reads one line from stdin.
fn confirm_sweep(args: &SweepArgs) -> anyhow::Result<bool> {
    let scope = if args.ids.is_empty() {
        "every matching message".to_string()
    } else {
        format!("{} selected message(s)", args.ids.len())
    };
    print!(
        "  About to {} {scope} in conversation '{}'. Continue? [y/N] ",
        args.action, args.conversation
    );
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
