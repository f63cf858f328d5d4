//! Work-interval time tracking.
//!
//! All mutations flow through the session manager so the store sees
//! them atomically with other session changes; this module only edits
//! the in-memory session.

use chrono::{Duration, Utc};

use daf_models::{Session, TimeTrackingState};

/// Returns the OS user owning new work intervals.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Start/pause/resume/stop operations over a session's work intervals.
pub struct TimeTracker;

impl TimeTracker {
    /// Opens a work interval (no-op when already running).
    pub fn start(session: &mut Session) {
        session.start_work(current_user());
    }

    /// Closes the open interval; returns false when none was open.
    pub fn pause(session: &mut Session) -> bool {
        if session.time_state != TimeTrackingState::Running {
            return false;
        }
        session.close_open_work_session(Utc::now());
        true
    }

    /// Reopens tracking after a pause.
    pub fn resume(session: &mut Session) {
        Self::start(session);
    }

    /// Closes the open interval for good (completion, process exit).
    pub fn stop(session: &mut Session) {
        session.close_open_work_session(Utc::now());
    }

    /// Total tracked time.
    pub fn elapsed(session: &Session) -> Duration {
        session.elapsed(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daf_models::SessionType;

    fn session() -> Session {
        Session::new("s", "goal", SessionType::Investigation)
    }

    #[test]
    fn test_start_then_pause() {
        let mut session = session();
        TimeTracker::start(&mut session);
        assert_eq!(session.time_state, TimeTrackingState::Running);

        assert!(TimeTracker::pause(&mut session));
        assert_eq!(session.time_state, TimeTrackingState::Paused);
        assert!(session.work_sessions.iter().all(|w| !w.is_open()));
    }

    #[test]
    fn test_pause_without_running_is_noop() {
        let mut session = session();
        assert!(!TimeTracker::pause(&mut session));
        assert!(session.work_sessions.is_empty());
    }

    #[test]
    fn test_pause_resume_opens_new_interval() {
        let mut session = session();
        TimeTracker::start(&mut session);
        TimeTracker::pause(&mut session);
        TimeTracker::resume(&mut session);

        assert_eq!(session.work_sessions.len(), 2);
        assert_eq!(
            session.work_sessions.iter().filter(|w| w.is_open()).count(),
            1
        );
    }

    #[test]
    fn test_elapsed_not_negative() {
        let mut session = session();
        TimeTracker::start(&mut session);
        assert!(TimeTracker::elapsed(&session) >= Duration::zero());
    }
}
