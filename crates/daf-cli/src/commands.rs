//! Command handlers for CLI subcommands.

use std::path::PathBuf;

use serde_json::{json, Value};

use daf_config::{fields, BackendConfig, Settings};
use daf_core::{
    CompleteOptions, CoreError, Interactor, NewSessionParams, NonInteractive, Result,
    SessionManager,
};
use daf_models::IssueKey;
use daf_tracker::{create_tracker, IssueFields, SyncFilter, TrackerError};

use crate::cli::{Cli, Commands, ConfigCommands, JiraCommands};
use crate::output::format_duration;
use crate::prompter::TerminalPrompter;

/// One executed command: the JSON payload for `--json` and the text a
/// human sees otherwise.
pub struct CommandOutput {
    pub data: Value,
    pub human: String,
}

impl CommandOutput {
    fn new(data: Value, human: impl Into<String>) -> Self {
        Self {
            data,
            human: human.into(),
        }
    }
}

/// Builds the manager and runs one command.
pub fn execute(cli: Cli) -> Result<CommandOutput> {
    let root = cli.home();
    let settings = Settings::load(&root, None)?;
    let backend = BackendConfig::load(&root, &settings.backend)?;
    let tracker = create_tracker(&settings, &backend)?;
    let interactor: Box<dyn Interactor> = if cli.json {
        Box::new(NonInteractive)
    } else {
        Box::new(TerminalPrompter::new()?)
    };
    let manager = SessionManager::new(&root, settings, backend, tracker, interactor);

    dispatch(&manager, cli.command)
}

fn dispatch(manager: &SessionManager, command: Commands) -> Result<CommandOutput> {
    match command {
        Commands::New {
            goal,
            name,
            dir,
            branch,
            workspace,
            template,
        } => cmd_new(manager, goal, name, dir, branch, workspace, template),
        Commands::Open {
            session,
            dir,
            new_conversation,
        } => cmd_open(manager, &session, dir, new_conversation),
        Commands::Complete {
            session,
            commit,
            message,
            pr_url,
            comment,
            skip_transition,
        } => cmd_complete(manager, &session, commit, message, pr_url, comment, skip_transition),
        Commands::Pause { session } => cmd_pause(manager, &session),
        Commands::Resume { session } => cmd_resume(manager, &session),
        Commands::Delete { session, force } => cmd_delete(manager, &session, force),
        Commands::List => cmd_list(manager),
        Commands::Info { session } => cmd_info(manager, &session),
        Commands::Active => cmd_active(manager),
        Commands::Time { session } => cmd_time(manager, &session),
        Commands::Link {
            session,
            issue,
            force,
        } => cmd_link(manager, &session, &issue, force),
        Commands::Unlink { session, force } => cmd_unlink(manager, &session, force),
        Commands::Note {
            session,
            text,
            push,
        } => cmd_note(manager, &session, &text, push),
        Commands::Notes { session } => cmd_notes(manager, &session),
        Commands::Sync {
            sprint,
            kinds,
            parent,
            assignee,
        } => cmd_sync(manager, sprint, kinds, parent, assignee),
        Commands::Investigate { name, goal } => cmd_investigate(manager, &name, &goal),
        Commands::Jira(jira) => dispatch_jira(manager, jira),
        Commands::Config(config) => dispatch_config(manager, config),
    }
}

fn dispatch_jira(manager: &SessionManager, command: JiraCommands) -> Result<CommandOutput> {
    match command {
        JiraCommands::New { kind, parent, goal } => {
            let parent = parent.as_deref().map(parse_issue_key).transpose()?;
            let session = manager.jira_new(&kind, parent.as_ref(), &goal)?;
            Ok(CommandOutput::new(
                serde_json::to_value(&session).unwrap_or(Value::Null),
                format!(
                    "started ticket-creation session '{}'; run 'daf jira create' from inside, \
                     then 'daf link'",
                    session.name
                ),
            ))
        }
        JiraCommands::Create {
            kind,
            project,
            summary,
            description,
            fields,
        } => {
            let mut issue_fields = IssueFields::new().summary(summary);
            if let Some(description) = description {
                issue_fields = issue_fields.description(description);
            }
            apply_field_args(manager, &mut issue_fields, &fields)?;
            let key = manager.jira_create(project.as_deref(), &kind, &issue_fields)?;
            Ok(CommandOutput::new(
                json!({"key": key.as_str()}),
                format!("created {}", key),
            ))
        }
        JiraCommands::Update { issue, fields } => {
            let key = parse_issue_key(&issue)?;
            let mut issue_fields = IssueFields::new();
            apply_field_args(manager, &mut issue_fields, &fields)?;
            manager.jira_update(&key, &issue_fields)?;
            Ok(CommandOutput::new(
                json!({"key": key.as_str()}),
                format!("updated {}", key),
            ))
        }
        JiraCommands::View { issue } => {
            let key = parse_issue_key(&issue)?;
            let details = manager.jira_view(&key)?;
            let human = format!(
                "{}: {} [{} / {}]\n{}",
                details.ticket.key,
                details.ticket.summary,
                details.ticket.kind,
                details.ticket.status,
                details.description.as_deref().unwrap_or("(no description)")
            );
            Ok(CommandOutput::new(
                serde_json::to_value(&details).unwrap_or(Value::Null),
                human,
            ))
        }
        JiraCommands::Fields { kind } => {
            let count = manager.refresh_fields(&kind)?;
            Ok(CommandOutput::new(
                json!({"fields": count}),
                format!("cached {} tracker fields", count),
            ))
        }
    }
}

fn dispatch_config(manager: &SessionManager, command: ConfigCommands) -> Result<CommandOutput> {
    match command {
        ConfigCommands::Show => {
            let settings = manager.settings();
            let data = json!({
                "backend": settings.backend,
                "tracker_url": settings.tracker_url,
                "project": settings.project,
                "workstream": settings.workstream,
                "agent": settings.agent,
                "summary_mode": settings.summary_mode,
                "workspace_roots": settings.workspace_roots,
            });
            let human = serde_json::to_string_pretty(&data).unwrap_or_default();
            Ok(CommandOutput::new(data, human))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_new(
    manager: &SessionManager,
    goal: String,
    name: Option<String>,
    dir: Option<PathBuf>,
    branch: Option<String>,
    workspace: Option<String>,
    template: Option<String>,
) -> Result<CommandOutput> {
    // Without --dir, try the configured workspace roots and keyword
    // hints before falling back to the current directory
    let work_dir = match dir {
        Some(dir) => dir,
        None => daf_config::suggest::suggest_work_dir(
            &manager.settings().workspace_roots,
            &manager.settings().repo_hints,
            &goal,
        )
        .map(Ok)
        .unwrap_or_else(|| {
            std::env::current_dir().map_err(|_| CoreError::InvalidPath(PathBuf::from(".")))
        })?,
    };
    let session = manager.new_session(NewSessionParams {
        name,
        goal,
        work_dir,
        branch,
        workspace,
        template,
    })?;
    Ok(CommandOutput::new(
        serde_json::to_value(&session).unwrap_or(Value::Null),
        format!("created session '{}'", session.name),
    ))
}

fn cmd_open(
    manager: &SessionManager,
    session: &str,
    dir: Option<PathBuf>,
    new_conversation: bool,
) -> Result<CommandOutput> {
    let session = manager.open(session, dir, new_conversation)?;
    Ok(CommandOutput::new(
        serde_json::to_value(&session).unwrap_or(Value::Null),
        format!("opened session '{}'", session.name),
    ))
}

fn cmd_complete(
    manager: &SessionManager,
    session: &str,
    commit: bool,
    message: Option<String>,
    pr_url: Option<String>,
    comment: Option<String>,
    skip_transition: bool,
) -> Result<CommandOutput> {
    let report = manager.complete(
        session,
        CompleteOptions {
            commit,
            commit_message: message,
            pr_url,
            comment,
            skip_transition,
        },
    )?;
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(CommandOutput::new(
        json!({
            "session": report.session.name,
            "warnings": report.warnings,
        }),
        format!("completed session '{}'", report.session.name),
    ))
}

fn cmd_pause(manager: &SessionManager, session: &str) -> Result<CommandOutput> {
    let paused = manager.pause(session)?;
    let human = if paused {
        "paused time tracking"
    } else {
        "nothing was running"
    };
    Ok(CommandOutput::new(json!({"paused": paused}), human))
}

fn cmd_resume(manager: &SessionManager, session: &str) -> Result<CommandOutput> {
    let session = manager.resume(session)?;
    Ok(CommandOutput::new(
        json!({"session": session.name}),
        format!("resumed '{}'", session.name),
    ))
}

fn cmd_delete(manager: &SessionManager, session: &str, force: bool) -> Result<CommandOutput> {
    manager.delete(session, force)?;
    Ok(CommandOutput::new(json!({"deleted": session}), format!("deleted '{}'", session)))
}

fn cmd_list(manager: &SessionManager) -> Result<CommandOutput> {
    let descriptors = manager.list()?;
    let mut lines = Vec::new();
    for descriptor in &descriptors {
        lines.push(format!(
            "{:<24} {:<12} {:<10} {}",
            descriptor.name,
            descriptor
                .issue_key
                .as_ref()
                .map(|k| k.as_str())
                .unwrap_or("-"),
            format!("{:?}", descriptor.status).to_lowercase(),
            descriptor.goal,
        ));
    }
    if lines.is_empty() {
        lines.push("no sessions".to_string());
    }
    Ok(CommandOutput::new(
        serde_json::to_value(&descriptors).unwrap_or(Value::Null),
        lines.join("\n"),
    ))
}

fn cmd_info(manager: &SessionManager, session: &str) -> Result<CommandOutput> {
    let (session, notes) = manager.info(session)?;
    let mut human = format!(
        "{} [{}]\n  goal: {}\n  type: {:?}\n  time: {}\n  conversations: {}",
        session.name,
        session
            .issue_key
            .as_ref()
            .map(|k| k.as_str())
            .unwrap_or("unlinked"),
        session.goal,
        session.session_type,
        format_duration(daf_core::TimeTracker::elapsed(&session)),
        session.conversations.len(),
    );
    if !notes.is_empty() {
        human.push_str(&format!("\n  notes: {}", notes.len()));
    }
    Ok(CommandOutput::new(
        json!({
            "session": serde_json::to_value(&session).unwrap_or(Value::Null),
            "notes": serde_json::to_value(&notes).unwrap_or(Value::Null),
        }),
        human,
    ))
}

fn cmd_active(manager: &SessionManager) -> Result<CommandOutput> {
    match SessionManager::active_session_name() {
        Some(name) => {
            let session = manager.resolve_session(&name)?;
            Ok(CommandOutput::new(
                json!({"active": session.name}),
                session.name,
            ))
        }
        None => Ok(CommandOutput::new(
            json!({"active": Value::Null}),
            "not inside an agent session",
        )),
    }
}

fn cmd_time(manager: &SessionManager, session: &str) -> Result<CommandOutput> {
    let elapsed = manager.elapsed(session)?;
    Ok(CommandOutput::new(
        json!({"minutes": elapsed.num_minutes()}),
        format_duration(elapsed),
    ))
}

fn cmd_link(
    manager: &SessionManager,
    session: &str,
    issue: &str,
    force: bool,
) -> Result<CommandOutput> {
    let key = parse_issue_key(issue)?;
    let session = manager.link(session, &key, force)?;
    Ok(CommandOutput::new(
        json!({"session": session.name, "issue": key.as_str()}),
        format!("linked '{}' to {}", session.name, key),
    ))
}

fn cmd_unlink(manager: &SessionManager, session: &str, force: bool) -> Result<CommandOutput> {
    let session = manager.unlink(session, force)?;
    Ok(CommandOutput::new(
        json!({"session": session.name}),
        format!("unlinked '{}'", session.name),
    ))
}

fn cmd_note(
    manager: &SessionManager,
    session: &str,
    text: &str,
    push: bool,
) -> Result<CommandOutput> {
    let note = manager.note_add(session, text, push)?;
    let human = if note.pushed_to_tracker {
        "note added and pushed to tracker"
    } else {
        "note added"
    };
    Ok(CommandOutput::new(
        serde_json::to_value(&note).unwrap_or(Value::Null),
        human,
    ))
}

fn cmd_notes(manager: &SessionManager, session: &str) -> Result<CommandOutput> {
    let notes = manager.notes(session)?;
    let human = notes
        .iter()
        .map(|note| {
            format!(
                "[{}] {}: {}",
                note.timestamp.format("%Y-%m-%d %H:%M"),
                note.author,
                note.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(CommandOutput::new(
        serde_json::to_value(&notes).unwrap_or(Value::Null),
        if human.is_empty() { "no notes".to_string() } else { human },
    ))
}

fn cmd_sync(
    manager: &SessionManager,
    sprint: Option<String>,
    kinds: Vec<String>,
    parent: Option<String>,
    assignee: Option<String>,
) -> Result<CommandOutput> {
    let parent = parent.as_deref().map(parse_issue_key).transpose()?;
    let report = manager.sync(SyncFilter {
        project: None,
        sprint,
        kinds,
        parent,
        assignee,
        custom: Vec::new(),
    })?;
    Ok(CommandOutput::new(
        json!({
            "created": report.created,
            "updated": report.updated,
        }),
        format!(
            "sync: {} created, {} updated",
            report.created.len(),
            report.updated.len()
        ),
    ))
}

fn cmd_investigate(manager: &SessionManager, name: &str, goal: &str) -> Result<CommandOutput> {
    let session = manager.investigate(name, goal)?;
    Ok(CommandOutput::new(
        serde_json::to_value(&session).unwrap_or(Value::Null),
        format!("created investigation session '{}'", session.name),
    ))
}

/// Parses an issue key argument.
fn parse_issue_key(s: &str) -> Result<IssueKey> {
    s.parse().map_err(|_| {
        CoreError::Invalid {
            what: "issue key".to_string(),
            message: format!("'{}' is not of the form PREFIX-123", s),
        }
    })
}

/// Applies `alias=value` field arguments, resolving aliases through the
/// cached field catalog and keeping the system/custom split intact.
fn apply_field_args(
    manager: &SessionManager,
    issue_fields: &mut IssueFields,
    args: &[String],
) -> Result<()> {
    let catalog = manager.field_catalog();
    for arg in args {
        let Some((alias, value)) = arg.split_once('=') else {
            return Err(CoreError::Invalid {
                what: "field".to_string(),
                message: format!("'{}' is not of the form alias=value", arg),
            });
        };
        let id = catalog
            .resolve(alias)
            .map(|spec| spec.id.clone())
            .unwrap_or_else(|| alias.to_string());
        let value = Value::String(value.to_string());

        let result = if fields::is_system_field_id(&id) {
            issue_fields.set_system(id, value)
        } else if fields::is_custom_field_id(&id) {
            issue_fields.set_custom(id, value)
        } else {
            Err(TrackerError::validation(
                id,
                "unknown field; run 'daf jira fields' to refresh the catalog",
            ))
        };
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daf_config::SettingsLayer;
    use daf_core::SafetyGuard;
    use daf_tracker::MockTracker;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_manager(root: &std::path::Path) -> SessionManager {
        SessionManager::new(
            root,
            Settings::resolve(SettingsLayer::default()),
            BackendConfig::default(),
            Arc::new(MockTracker::new()),
            Box::new(NonInteractive),
        )
        .with_guard(SafetyGuard::new(false))
        .suppress_agent_launch()
    }

    #[test]
    fn test_parse_issue_key_rejects_garbage() {
        assert!(parse_issue_key("PROJ-1").is_ok());
        assert!(parse_issue_key("not a key").is_err());
    }

    #[test]
    fn test_apply_field_args_requires_pairs() {
        let dir = tempdir().unwrap();
        let manager = test_manager(dir.path());
        let mut fields = IssueFields::new();

        let err = apply_field_args(&manager, &mut fields, &["oops".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::Invalid { .. }));
    }

    #[test]
    fn test_apply_field_args_system_and_custom() {
        let dir = tempdir().unwrap();
        let manager = test_manager(dir.path());
        let mut fields = IssueFields::new();

        apply_field_args(
            &manager,
            &mut fields,
            &["labels=infra".to_string(), "customfield_10010=x".to_string()],
        )
        .unwrap();

        assert!(fields.system.contains_key("labels"));
        assert!(fields.custom.contains_key("customfield_10010"));
    }

    #[test]
    fn test_apply_field_args_unknown_alias() {
        let dir = tempdir().unwrap();
        let manager = test_manager(dir.path());
        let mut fields = IssueFields::new();

        let err =
            apply_field_args(&manager, &mut fields, &["mystery=x".to_string()]).unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_list_with_empty_store() {
        let dir = tempdir().unwrap();
        let manager = test_manager(dir.path());
        let output = cmd_list(&manager).unwrap();
        assert_eq!(output.human, "no sessions");
    }
}
