// `draftkeep edit`: interactive editing session with debounced autosave.
//
// Reads one command per line from stdin:
//
//   set <field> <value>            replace title, body, tags or category
//   add-tag <tag> | remove-tag <tag>
//   attach <url> <name> <type>
//   save | retry | status | show | close | quit | help
//
// Ctrl-C while changes are unsaved (or a save is running) only warns; a
// second Ctrl-C quits without saving.

use std::io;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use draftkeep_autosave::config::TOKEN_ENV_VAR;
use draftkeep_autosave::{
    CloseConfirmer, CloseOutcome, DocumentStore, EditingSession, FlagUnloadHook, HttpStore,
    MemoryStore, SaveOutcome,
};
use draftkeep_common::edit::{FieldEdit, FieldName};
use draftkeep_common::status::SaveStatus;
use draftkeep_common::types::{DocumentId, DraftFields};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use super::Context;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

const HELP: &str = "\
commands:
  set <field> <value>          field: title, body, tags (comma separated), category
                               `\\n` in a value is a line break
  add-tag <tag>                remove-tag <tag>
  attach <url> <name> <type>
  save                         save now instead of waiting for the quiet period
  retry                        retry after a failed save
  status                       show save status
  show                         show the current fields
  close | quit                 save pending changes and end the session";

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Existing document to open.
    #[arg(long, conflicts_with = "new")]
    doc: Option<DocumentId>,

    /// Create a new empty document (the default without --doc).
    #[arg(long)]
    new: bool,

    /// Keep the document in memory instead of the configured document API.
    #[arg(long, conflicts_with = "doc")]
    offline: bool,

    /// Discard unsaved changes without asking if the final save fails.
    #[arg(long)]
    discard_on_failure: bool,
}

pub fn run(args: EditArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(open_and_drive(args, config, ctx.format))
}

async fn open_and_drive(
    args: EditArgs,
    config: draftkeep_autosave::Config,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let policy = config.autosave.policy();

    if args.offline {
        let session = EditingSession::open_new(MemoryStore::new(), policy)
            .await
            .context("failed to create document")?;
        return drive(session, &args, format).await;
    }

    let mut store =
        HttpStore::from_config(&config.remote).context("failed to set up document API client")?;
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        store = store.with_auth_token(token);
    }
    let session = match args.doc {
        Some(id) => EditingSession::open_existing(store, id, policy)
            .await
            .with_context(|| format!("failed to open document {id}"))?,
        None => EditingSession::open_new(store, policy).await.context("failed to create document")?,
    };
    drive(session, &args, format).await
}

async fn drive<S: DocumentStore>(
    session: EditingSession<S>,
    args: &EditArgs,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let hook = FlagUnloadHook::new();
    session.install_unload_hook(Arc::new(hook.clone()));
    let reporter = tokio::spawn(report_status(session.subscribe(), format));
    let mut interrupts = spawn_interrupt_listener();

    let input = Arc::new(LineInput::stdin());
    let confirmer = PromptConfirmer {
        input: Arc::clone(&input),
        format,
        discard_on_failure: args.discard_on_failure,
    };

    emit(
        format,
        &Event::Opened {
            document_id: session.document_id(),
            fields: session.fields(),
            status: session.status(),
        },
    )?;

    let mut warned = false;
    let code = loop {
        let line = tokio::select! {
            line = input.next_line() => line.context("failed to read stdin")?,
            Some(()) = interrupts.recv() => {
                if hook.is_armed() {
                    if warned {
                        warn!(
                            document_id = %session.document_id(),
                            "quitting with unsaved changes"
                        );
                        break ExitCode::CloseAborted;
                    }
                    output::print_warning(
                        format,
                        "UNSAVED_CHANGES",
                        "changes are unsaved or still saving; press Ctrl-C again to quit \
                         without saving, or type `close`",
                    );
                    warned = true;
                    continue;
                }
                Some("close".to_string())
            }
        };

        let Some(line) = line else {
            debug!("stdin closed, closing session");
            match execute(&session, ReplCommand::Close, &confirmer, format).await? {
                Flow::Exit(code) => break code,
                Flow::Continue => break ExitCode::CloseAborted,
            }
        };
        warned = false;

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                output::print_error(format, "USAGE", &format!("{error:#}"));
                continue;
            }
        };
        match execute(&session, command, &confirmer, format).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit(code)) => break code,
            Err(error) => output::print_anyhow_error(format, &error),
        }
    };

    reporter.abort();
    Ok(code)
}

fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

// ── Commands ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Edit(FieldEdit),
    Save,
    Retry,
    Status,
    Show,
    Close,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit(ExitCode),
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
fn parse_command(line: &str) -> anyhow::Result<Option<ReplCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = split_word(line);

    let command = match verb {
        "set" => {
            let (field, value) = split_word(rest);
            if field.is_empty() {
                anyhow::bail!("usage: set <field> <value>");
            }
            let name: FieldName = field.parse()?;
            ReplCommand::Edit(FieldEdit::from_name_value(name, &value.replace("\\n", "\n"))?)
        }
        "add-tag" => ReplCommand::Edit(FieldEdit::AddTag(required(rest, "add-tag <tag>")?)),
        "remove-tag" => {
            ReplCommand::Edit(FieldEdit::RemoveTag(required(rest, "remove-tag <tag>")?))
        }
        "attach" => ReplCommand::Edit(FieldEdit::attachment_from_args(rest)?),
        "save" => ReplCommand::Save,
        "retry" => ReplCommand::Retry,
        "status" => ReplCommand::Status,
        "show" => ReplCommand::Show,
        "close" | "quit" | "exit" => ReplCommand::Close,
        "help" | "?" => ReplCommand::Help,
        other => anyhow::bail!("unknown command `{other}` (try `help`)"),
    };
    Ok(Some(command))
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn required(value: &str, usage: &str) -> anyhow::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("usage: {usage}");
    }
    Ok(value.to_string())
}

async fn execute<S, C>(
    session: &EditingSession<S>,
    command: ReplCommand,
    confirmer: &C,
    format: OutputFormat,
) -> anyhow::Result<Flow>
where
    S: DocumentStore,
    C: CloseConfirmer,
{
    match command {
        ReplCommand::Edit(edit) => {
            let field = edit.field();
            let changed = session.edit(edit)?;
            emit(format, &Event::Edited { field, changed })?;
        }
        ReplCommand::Save => {
            let outcome = session.save_now().await?;
            emit(format, &Event::from_outcome(outcome))?;
        }
        ReplCommand::Retry => {
            let outcome = session.retry_now().await?;
            emit(format, &Event::from_outcome(outcome))?;
        }
        ReplCommand::Status => {
            emit(format, &Event::Status { status: session.status() })?;
        }
        ReplCommand::Show => {
            emit(format, &Event::Fields { fields: session.fields() })?;
        }
        ReplCommand::Help => {
            if format == OutputFormat::Human {
                println!("{HELP}");
            }
        }
        ReplCommand::Close => match session.close(confirmer).await? {
            CloseOutcome::Closed(report) => {
                if report.discarded_unsaved {
                    output::print_warning(format, "CHANGES_DISCARDED", "unsaved changes discarded");
                }
                emit(
                    format,
                    &Event::Closed {
                        document_id: session.document_id(),
                        discarded_unsaved: report.discarded_unsaved,
                        wait_timed_out: report.wait_timed_out,
                    },
                )?;
                return Ok(Flow::Exit(ExitCode::Success));
            }
            CloseOutcome::Aborted { reason } => {
                output::print_warning(
                    format,
                    "CLOSE_ABORTED",
                    &format!("close aborted ({reason}); the session stays open, try `retry`"),
                );
            }
        },
    }
    Ok(Flow::Continue)
}

// ── Output ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event {
    Opened { document_id: DocumentId, fields: DraftFields, status: SaveStatus },
    Edited { field: FieldName, changed: bool },
    Save { outcome: &'static str, saved_at: Option<DateTime<Utc>>, error: Option<String> },
    Status { status: SaveStatus },
    Fields { fields: DraftFields },
    Closed { document_id: DocumentId, discarded_unsaved: bool, wait_timed_out: bool },
}

impl Event {
    fn from_outcome(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Saved { at } => {
                Self::Save { outcome: "saved", saved_at: Some(at), error: None }
            }
            SaveOutcome::Deferred => {
                Self::Save { outcome: "deferred", saved_at: None, error: None }
            }
            SaveOutcome::Failed { error } => {
                Self::Save { outcome: "failed", saved_at: None, error: Some(error) }
            }
            SaveOutcome::Abandoned => {
                Self::Save { outcome: "abandoned", saved_at: None, error: None }
            }
        }
    }

    fn human(&self) -> String {
        match self {
            Self::Opened { document_id, fields, status } => format!(
                "Editing {document_id} ({})\n{}\nType `help` for commands.",
                describe_status(status),
                describe_fields(fields)
            ),
            Self::Edited { field, changed: true } => format!("{} updated", field.as_str()),
            Self::Edited { field, changed: false } => format!("{} unchanged", field.as_str()),
            Self::Save { saved_at: Some(at), .. } => format!("saved at {}", local_time(at)),
            Self::Save { error: Some(error), .. } => format!("save failed: {error}"),
            Self::Save { outcome, .. } if *outcome == "deferred" => {
                "save queued behind the one in flight".to_string()
            }
            Self::Save { outcome, .. } => format!("save {outcome}"),
            Self::Status { status } => describe_status(status),
            Self::Fields { fields } => describe_fields(fields),
            Self::Closed { document_id, discarded_unsaved, .. } => {
                if *discarded_unsaved {
                    format!("Closed {document_id} (unsaved changes discarded)")
                } else {
                    format!("Closed {document_id}")
                }
            }
        }
    }
}

fn emit(format: OutputFormat, event: &Event) -> io::Result<()> {
    output::print_output(format, event, Event::human)
}

async fn report_status(mut status: watch::Receiver<SaveStatus>, format: OutputFormat) {
    let mut last = status.borrow_and_update().state;
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if current.state == last {
            continue;
        }
        last = current.state;
        let _ = emit(format, &Event::Status { status: current });
    }
}

fn describe_status(status: &SaveStatus) -> String {
    let mut parts = vec![status.state.as_str().to_string()];
    if status.has_unsaved_changes {
        parts.push("unsaved changes".to_string());
    }
    if status.is_saving && status.retry_attempt > 0 {
        parts.push(format!("retry {}", status.retry_attempt));
    }
    if let Some(at) = &status.last_saved_at {
        parts.push(format!("last saved {}", local_time(at)));
    }
    if let Some(error) = &status.last_error {
        parts.push(format!("error: {error}"));
    }
    parts.join(", ")
}

fn describe_fields(fields: &DraftFields) -> String {
    let category = fields.category.map_or("none", |c| c.as_str());
    let mut out = format!(
        "title:    {}\ncategory: {category}\ntags:     {}\nbody:\n{}",
        fields.title,
        fields.tags.join(", "),
        fields.body
    );
    for attachment in &fields.attachments {
        out.push_str(&format!(
            "\nattached: {} ({}) {}",
            attachment.name, attachment.media_type, attachment.url
        ));
    }
    out
}

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

// ── Input ──────────────────────────────────────────────────────────

/// Stdin lines shared by the command loop and the close prompt.
struct LineInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl LineInput {
    fn stdin() -> Self {
        Self { lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()) }
    }

    async fn next_line(&self) -> io::Result<Option<String>> {
        self.lines.lock().await.next_line().await
    }
}

struct PromptConfirmer {
    input: Arc<LineInput>,
    format: OutputFormat,
    discard_on_failure: bool,
}

impl CloseConfirmer for PromptConfirmer {
    async fn confirm_discard(&self, reason: &str) -> bool {
        if self.discard_on_failure {
            return true;
        }
        output::print_warning(
            self.format,
            "FINAL_SAVE_FAILED",
            &format!("final save failed: {reason}. Discard unsaved changes? [y/N]"),
        );
        match self.input.next_line().await {
            Ok(Some(answer)) => is_yes(&answer),
            _ => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
