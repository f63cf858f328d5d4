//! End-to-end manager scenarios over the mock tracker and a
//! capture-capable adapter with a redirected storage root.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use tempfile::{tempdir, TempDir};

use daf_agents::{AgentRegistry, CaptureConfig, ClaudeAdapter};
use daf_config::{
    BackendConfig, FailurePolicy, Settings, SettingsLayer, TransitionPolicy,
};
use daf_models::{AgentSessionId, SessionStatus, SessionType};
use daf_tracker::mock::{MockIssue, ScriptedFailure};
use daf_tracker::{IssueFields, IssueTracker, MockTracker, SyncFilter, TrackerError};

use crate::error::CoreError;
use crate::guard::SafetyGuard;
use crate::interact::{Interactor, NonInteractive};
use crate::manager::{CompleteOptions, NewSessionParams, SessionManager};

/// Interactor with queued answers for scripted flows.
struct Scripted {
    confirms: Mutex<VecDeque<bool>>,
    choices: Mutex<VecDeque<usize>>,
    inputs: Mutex<VecDeque<String>>,
}

impl Scripted {
    fn new() -> Self {
        Self {
            confirms: Mutex::new(VecDeque::new()),
            choices: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(VecDeque::new()),
        }
    }

    fn confirm_with(self, answer: bool) -> Self {
        self.confirms.lock().unwrap().push_back(answer);
        self
    }
}

impl Interactor for Scripted {
    fn confirm(&self, message: &str) -> crate::error::Result<bool> {
        self.confirms
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::NeedsInteractive(message.to_string()))
    }

    fn choose(&self, message: &str, _options: &[&str]) -> crate::error::Result<usize> {
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::NeedsInteractive(message.to_string()))
    }

    fn input(&self, message: &str) -> crate::error::Result<String> {
        self.inputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::NeedsInteractive(message.to_string()))
    }
}

struct Fixture {
    store_root: TempDir,
    agent_root: TempDir,
    work_dir: TempDir,
    tracker: Arc<MockTracker>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store_root: tempdir().unwrap(),
            agent_root: tempdir().unwrap(),
            work_dir: tempdir().unwrap(),
            tracker: Arc::new(MockTracker::new()),
        }
    }

    fn settings(&self) -> Settings {
        Settings::resolve(SettingsLayer::default())
    }

    fn manager_with(
        &self,
        settings: Settings,
        interactor: Box<dyn Interactor>,
    ) -> SessionManager {
        let mut agents = AgentRegistry::new();
        agents.register(Arc::new(ClaudeAdapter::with_storage_root(
            self.agent_root.path(),
        )));
        SessionManager::new(
            self.store_root.path(),
            settings,
            BackendConfig::default(),
            self.tracker.clone(),
            interactor,
        )
        .with_guard(SafetyGuard::new(false))
        .with_agents(agents)
        .with_capture_config(CaptureConfig {
            interval: StdDuration::from_millis(20),
            timeout: StdDuration::from_secs(3),
        })
        .suppress_agent_launch()
    }

    fn manager(&self) -> SessionManager {
        self.manager_with(self.settings(), Box::new(NonInteractive))
    }

    /// Directory where the redirected adapter stores conversation files
    /// for a work dir.
    fn conversation_dir(&self, work_dir: &Path) -> PathBuf {
        use daf_agents::AgentAdapter;
        ClaudeAdapter::with_storage_root(self.agent_root.path())
            .conversation_dir(work_dir)
            .unwrap()
    }

    /// Simulates the agent minting its conversation file shortly after
    /// spawn.
    fn write_conversation_soon(&self, work_dir: &Path, id: &str, delay_ms: u64) {
        let dir = self.conversation_dir(work_dir);
        let id = id.to_string();
        std::thread::spawn(move || {
            std::thread::sleep(StdDuration::from_millis(delay_ms));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join(format!("{}.jsonl", id)),
                "{\"message\": {\"content\": \"analyzed the issue\"}}\n\
                 {\"message\": {\"content\": \"implemented the fix\"}}\n",
            )
            .unwrap();
        });
    }

    fn new_params(&self, name: &str) -> NewSessionParams {
        NewSessionParams {
            name: Some(name.to_string()),
            goal: "G".to_string(),
            work_dir: self.work_dir.path().to_path_buf(),
            branch: None,
            workspace: None,
            template: None,
        }
    }
}

// Scenario: create + capture. The mock agent writes its conversation
// file 200 ms after spawn; the new session ends up bound to its id.
#[test]
fn test_new_session_captures_conversation_id() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_conversation_soon(fixture.work_dir.path(), "abc-123", 200);

    let session = manager.new_session(fixture.new_params("feat-x")).unwrap();

    assert_eq!(session.name, "feat-x");
    assert_eq!(session.status, SessionStatus::InProgress);
    assert_eq!(session.conversations.len(), 1);
    let context = &session.active_conversation().unwrap().active;
    assert_eq!(context.agent_session_id, Some(AgentSessionId::new("abc-123")));
    assert_eq!(context.message_count, 2);
    assert_eq!(
        session.work_sessions.iter().filter(|w| w.is_open()).count(),
        1
    );

    // And the captured id survived persistence
    let loaded = manager.store().load("feat-x").unwrap();
    let context = &loaded.active_conversation().unwrap().active;
    assert_eq!(context.agent_session_id, Some(AgentSessionId::new("abc-123")));
}

// Scenario: safety refusal. A mutating operation inside an agent exits
// with code 3 and writes nothing.
#[test]
fn test_safety_guard_blocks_new_inside_agent() {
    let fixture = Fixture::new();
    let manager = fixture
        .manager()
        .with_guard(SafetyGuard::new(true));

    let err = manager.new_session(fixture.new_params("x")).unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("inside agent"));
    assert!(manager.store().load_all().unwrap().sessions.is_empty());
}

// Scenario: sync idempotence. The second run with unchanged remote
// state leaves sessions.json byte-identical.
#[test]
fn test_sync_is_idempotent() {
    let fixture = Fixture::new();
    fixture
        .tracker
        .add_issue(MockIssue::new("PROJ-1", "First story", "Story"));
    fixture
        .tracker
        .add_issue(MockIssue::new("PROJ-2", "A bug", "Bug"));
    let manager = fixture.manager();

    let report = manager.sync(SyncFilter::default()).unwrap();
    assert_eq!(report.created, vec!["PROJ-1", "PROJ-2"]);

    let index_path = fixture.store_root.path().join("sessions.json");
    let first = std::fs::read(&index_path).unwrap();

    let report = manager.sync(SyncFilter::default()).unwrap();
    assert!(report.created.is_empty());
    assert!(report.updated.is_empty());
    assert_eq!(std::fs::read(&index_path).unwrap(), first);

    let session = manager.store().load("PROJ-1").unwrap();
    assert_eq!(session.goal, "First story");
    assert_eq!(session.issue_key.as_ref().unwrap().as_str(), "PROJ-1");
}

#[test]
fn test_sync_pulls_summary_forward_but_keeps_local_fields() {
    let fixture = Fixture::new();
    fixture
        .tracker
        .add_issue(MockIssue::new("PROJ-1", "Old summary", "Story"));
    let manager = fixture.manager();
    manager.sync(SyncFilter::default()).unwrap();

    manager.note_add("PROJ-1", "local note", false).unwrap();
    fixture
        .tracker
        .update_issue(
            &"PROJ-1".parse().unwrap(),
            &IssueFields::new().summary("New summary"),
        )
        .unwrap();

    let report = manager.sync(SyncFilter::default()).unwrap();
    assert_eq!(report.updated, vec!["PROJ-1"]);
    assert_eq!(manager.store().load("PROJ-1").unwrap().goal, "New summary");
    // Local-only state survives the update
    assert_eq!(manager.notes("PROJ-1").unwrap().len(), 1);
}

// Scenario: transition best-effort. A 500 from the tracker demotes to a
// warning under on_fail=warn and the session still completes locally.
#[test]
fn test_complete_transition_failure_warns() {
    let fixture = Fixture::new();
    fixture
        .tracker
        .add_issue(MockIssue::new("PROJ-1", "story", "Story"));

    let layer = SettingsLayer {
        on_complete: Some(TransitionPolicy {
            prompt: false,
            to: Some("Done".to_string()),
            on_fail: FailurePolicy::Warn,
        }),
        ..Default::default()
    };
    let manager = fixture.manager_with(Settings::resolve(layer), Box::new(NonInteractive));

    manager.investigate("inv", "check things").unwrap();
    manager.link("inv", &"PROJ-1".parse().unwrap(), true).unwrap();
    fixture.tracker.fail_transition_with(ScriptedFailure::Api(500));

    let report = manager.complete("inv", CompleteOptions::default()).unwrap();

    assert_eq!(report.session.status, SessionStatus::Complete);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("transition failed")));
    // The comment still went through
    assert_eq!(fixture.tracker.recorded_comments().len(), 1);
    // And the local record is closed for good
    let loaded = manager.store().load("inv").unwrap();
    assert_eq!(loaded.status, SessionStatus::Complete);
    assert!(loaded.work_sessions.iter().all(|w| !w.is_open()));
}

#[test]
fn test_complete_transition_failure_blocks_when_configured() {
    let fixture = Fixture::new();
    fixture
        .tracker
        .add_issue(MockIssue::new("PROJ-1", "story", "Story"));

    let layer = SettingsLayer {
        on_complete: Some(TransitionPolicy {
            prompt: false,
            to: Some("Done".to_string()),
            on_fail: FailurePolicy::Block,
        }),
        ..Default::default()
    };
    let manager = fixture.manager_with(Settings::resolve(layer), Box::new(NonInteractive));
    manager.investigate("inv", "g").unwrap();
    manager.link("inv", &"PROJ-1".parse().unwrap(), true).unwrap();
    fixture.tracker.fail_transition_with(ScriptedFailure::Api(500));

    let err = manager.complete("inv", CompleteOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::Tracker(TrackerError::Api { .. })));
    // The session was NOT completed
    assert_ne!(
        manager.store().load("inv").unwrap().status,
        SessionStatus::Complete
    );
}

// Scenario: archived conversation chain. Opening with a new
// conversation archives the old context and chains its id into the
// fresh context's history.
#[test]
fn test_open_new_conversation_archives_and_chains() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_conversation_soon(fixture.work_dir.path(), "a1", 100);
    manager.new_session(fixture.new_params("feat-x")).unwrap();

    fixture.write_conversation_soon(fixture.work_dir.path(), "a2", 100);
    let session = manager.open("feat-x", None, true).unwrap();

    let conversation = session.active_conversation().unwrap();
    assert_eq!(
        conversation.active.agent_session_id,
        Some(AgentSessionId::new("a2"))
    );
    assert_eq!(conversation.archived.len(), 1);
    assert!(conversation.archived[0].archived);
    assert_eq!(
        conversation.archived[0].agent_session_id,
        Some(AgentSessionId::new("a1"))
    );
    // The local summarizer extracted the transcript tail
    assert_eq!(
        conversation.archived[0].summary.as_deref(),
        Some("implemented the fix")
    );
    assert_eq!(conversation.active.history, vec![AgentSessionId::new("a1")]);
}

// Scenario: validation error surface. Field-level messages from the
// tracker reach the caller typed, with exit code 6.
#[test]
fn test_jira_create_surfaces_field_validation() {
    let fixture = Fixture::new();
    fixture.tracker.require_field("customfield_10010");
    let manager = fixture.manager();

    let err = manager
        .jira_create(Some("PROJ"), "Story", &IssueFields::new().summary("s"))
        .unwrap_err();

    assert_eq!(err.exit_code(), 6);
    assert_eq!(err.code(), "VALIDATION_ERROR");
    let details = err.details().unwrap();
    assert_eq!(details["field_errors"]["customfield_10010"], "required");
}

#[test]
fn test_capture_timeout_fails_cleanly_without_interaction() {
    let fixture = Fixture::new();
    let manager = fixture
        .manager()
        .with_capture_config(CaptureConfig {
            interval: StdDuration::from_millis(20),
            timeout: StdDuration::from_millis(100),
        });
    // No conversation file is ever written

    let err = manager.new_session(fixture.new_params("feat-x")).unwrap_err();
    assert!(matches!(err, CoreError::NeedsInteractive(_)));
}

#[test]
fn test_capture_timeout_accepts_manual_id() {
    let fixture = Fixture::new();
    let scripted = Scripted::new();
    scripted.inputs.lock().unwrap().push_back("manual-7".to_string());
    let manager = fixture
        .manager_with(fixture.settings(), Box::new(scripted))
        .with_capture_config(CaptureConfig {
            interval: StdDuration::from_millis(20),
            timeout: StdDuration::from_millis(100),
        });

    let session = manager.new_session(fixture.new_params("feat-x")).unwrap();
    assert_eq!(
        session.active_conversation().unwrap().active.agent_session_id,
        Some(AgentSessionId::new("manual-7"))
    );
}

#[test]
fn test_new_session_name_conflict() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.write_conversation_soon(fixture.work_dir.path(), "a1", 50);
    manager.new_session(fixture.new_params("feat-x")).unwrap();

    let err = manager.new_session(fixture.new_params("feat-x")).unwrap_err();
    assert!(matches!(err, CoreError::Conflict(name) if name == "feat-x"));
}

#[test]
fn test_new_session_rejects_missing_work_dir() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let mut params = fixture.new_params("feat-x");
    params.work_dir = PathBuf::from("/no/such/dir");

    assert!(matches!(
        manager.new_session(params),
        Err(CoreError::InvalidPath(_))
    ));
}

#[test]
fn test_open_missing_work_dir_fails_in_json_mode() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let vanishing = tempdir().unwrap();
    let mut params = fixture.new_params("feat-x");
    params.work_dir = vanishing.path().to_path_buf();
    fixture.write_conversation_soon(vanishing.path(), "a1", 50);
    manager.new_session(params).unwrap();

    drop(vanishing);
    let err = manager.open("feat-x", None, false).unwrap_err();
    assert!(matches!(err, CoreError::InvalidPath(_)));
}

#[test]
fn test_pause_resume_cycle() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager.investigate("inv", "g").unwrap();

    assert!(manager.pause("inv").unwrap());
    let paused = manager.store().load("inv").unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert!(paused.work_sessions.iter().all(|w| !w.is_open()));

    manager.resume("inv").unwrap();
    let resumed = manager.store().load("inv").unwrap();
    assert_eq!(resumed.status, SessionStatus::InProgress);
    assert_eq!(resumed.work_sessions.len(), 2);
    assert_eq!(
        resumed.work_sessions.iter().filter(|w| w.is_open()).count(),
        1
    );

    // Pausing again with nothing running reports false
    manager.pause("inv").unwrap();
    assert!(!manager.pause("inv").unwrap());
}

#[test]
fn test_resume_complete_session_rejected() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager.investigate("inv", "g").unwrap();
    manager.complete("inv", CompleteOptions::default()).unwrap();

    assert!(matches!(
        manager.resume("inv"),
        Err(CoreError::Invalid { .. })
    ));
}

#[test]
fn test_link_validates_issue_exists() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager.investigate("inv", "g").unwrap();

    let err = manager
        .link("inv", &"PROJ-404".parse().unwrap(), true)
        .unwrap_err();
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_link_then_unlink_restores_tracker_fields() {
    let fixture = Fixture::new();
    fixture.tracker.add_issue(MockIssue::new("PROJ-1", "s", "Story"));
    let manager = fixture.manager();
    manager.investigate("inv", "g").unwrap();
    manager.note_add("inv", "finding", false).unwrap();

    manager.link("inv", &"PROJ-1".parse().unwrap(), true).unwrap();
    assert!(manager.store().load("inv").unwrap().issue_key.is_some());

    manager.unlink("inv", true).unwrap();
    let session = manager.store().load("inv").unwrap();
    assert!(session.issue_key.is_none());
    // Local-only fields untouched
    assert_eq!(manager.notes("inv").unwrap().len(), 1);
    assert!(!session.work_sessions.is_empty());
}

#[test]
fn test_note_push_marks_note_and_records_comment() {
    let fixture = Fixture::new();
    fixture.tracker.add_issue(MockIssue::new("PROJ-1", "s", "Story"));
    let manager = fixture.manager();
    manager.investigate("inv", "g").unwrap();
    manager.link("inv", &"PROJ-1".parse().unwrap(), true).unwrap();

    let note = manager.note_add("inv", "pushed note", true).unwrap();
    assert!(note.pushed_to_tracker);
    assert_eq!(
        fixture.tracker.recorded_comments(),
        vec![("PROJ-1".to_string(), "pushed note".to_string())]
    );
    assert!(manager.notes("inv").unwrap()[0].pushed_to_tracker);
}

#[test]
fn test_note_push_failure_keeps_local_note() {
    let fixture = Fixture::new();
    fixture.tracker.add_issue(MockIssue::new("PROJ-1", "s", "Story"));
    fixture.tracker.fail_comment_with(ScriptedFailure::Unavailable);
    let manager = fixture.manager();
    manager.investigate("inv", "g").unwrap();
    manager.link("inv", &"PROJ-1".parse().unwrap(), true).unwrap();

    let note = manager.note_add("inv", "kept locally", true).unwrap();
    assert!(!note.pushed_to_tracker);
    let notes = manager.notes("inv").unwrap();
    assert_eq!(notes.len(), 1);
    assert!(!notes[0].pushed_to_tracker);
}

#[test]
fn test_delete_requires_confirmation() {
    let fixture = Fixture::new();
    let manager =
        fixture.manager_with(fixture.settings(), Box::new(Scripted::new().confirm_with(false)));
    manager.investigate("inv", "g").unwrap();

    assert!(matches!(manager.delete("inv", false), Err(CoreError::Cancelled)));
    assert!(manager.store().exists("inv"));

    manager.delete("inv", true).unwrap();
    assert!(!manager.store().exists("inv"));
}

#[test]
fn test_resolve_by_issue_key_and_prefix() {
    let fixture = Fixture::new();
    fixture.tracker.add_issue(MockIssue::new("PROJ-1", "s", "Story"));
    let manager = fixture.manager();
    manager.investigate("inv-payments", "g").unwrap();
    manager.link("inv-payments", &"PROJ-1".parse().unwrap(), true).unwrap();

    assert_eq!(manager.resolve_session("PROJ-1").unwrap().name, "inv-payments");
    assert_eq!(manager.resolve_session("inv-pay").unwrap().name, "inv-payments");
    assert!(matches!(
        manager.resolve_session("zzz"),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn test_jira_new_creates_temp_session_and_rename() {
    let fixture = Fixture::new();
    fixture.tracker.add_issue(MockIssue::new("PROJ-9", "s", "Story"));
    // A non-capture agent: the draft session gets a synthesized id
    let layer = SettingsLayer {
        agent: Some("cursor".to_string()),
        ..Default::default()
    };
    let manager = fixture.manager_with(Settings::resolve(layer), Box::new(NonInteractive));

    let session = manager.jira_new("Story", None, "draft a story").unwrap();
    assert_eq!(session.session_type, SessionType::TicketCreation);
    let conversation = session.active_conversation().unwrap();
    assert!(conversation.temp_dir.is_some());
    let context = &conversation.active;
    assert!(context
        .agent_session_id
        .as_ref()
        .is_some_and(|id| id.is_synthesized()));

    let renamed = manager
        .bind_created_issue(&session.name, &"PROJ-9".parse().unwrap())
        .unwrap();
    assert_eq!(renamed.name, "creation-PROJ-9");
    assert!(manager.store().exists("creation-PROJ-9"));
    assert_eq!(renamed.issue_key.as_ref().unwrap().as_str(), "PROJ-9");
}

#[test]
fn test_open_reopens_closed_issue_when_policy_always() {
    let fixture = Fixture::new();
    fixture
        .tracker
        .add_issue(MockIssue::new("PROJ-1", "s", "Story").with_status("Done"));

    let layer = SettingsLayer {
        prompts: Some(daf_config::PromptsPolicy {
            reopen_closed: daf_config::PromptChoice::Always,
            ..Default::default()
        }),
        on_open: Some(TransitionPolicy {
            prompt: false,
            to: Some("In Progress".to_string()),
            on_fail: FailurePolicy::Warn,
        }),
        ..Default::default()
    };
    let manager = fixture.manager_with(Settings::resolve(layer), Box::new(NonInteractive));
    manager.investigate("inv", "g").unwrap();
    manager.link("inv", &"PROJ-1".parse().unwrap(), true).unwrap();

    manager.open("inv", None, false).unwrap();

    assert_eq!(
        fixture.tracker.recorded_transitions(),
        vec![("PROJ-1".to_string(), "In Progress".to_string())]
    );
}

#[test]
fn test_list_orders_by_recency() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager.investigate("first", "g").unwrap();
    std::thread::sleep(StdDuration::from_millis(10));
    manager.investigate("second", "g").unwrap();

    let descriptors = manager.list().unwrap();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].name, "second");
}
