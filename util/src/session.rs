//! Session management
//!
//! A session is one run of an executable. It fixes the epoch used to timestamp log lines and owns
//! a directory, `sessions/{exec_name}_{timestamp}`, holding the run's log file.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use log::info;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Format of the timestamp in session directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Clone, Debug)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionDirError {
    #[error("Cannot find the software root directory: {0}")]
    SwRootError(std::io::Error),

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the \
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start the session for `exec_name`, creating `{sw_root}/{sessions_dir}/{exec_name}_{timestamp}`.
    ///
    /// Only one session may be started per process, a second call fails with
    /// [`SessionDirError::CannotInitEpoch`].
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionDirError> {
        SESSION_EPOCH.try_init_once(Utc::now)
            .map_err(|e| SessionDirError::CannotInitEpoch(e))?;

        let timestamp = SESSION_EPOCH.get()
            .ok_or(SessionDirError::CannotGetEpoch)?
            .format(TIMESTAMP_FORMAT);

        let session_root = crate::host::get_sw_root()
            .map_err(|e| SessionDirError::SwRootError(e))?
            .join(sessions_dir)
            .join(format!("{}_{}", exec_name, timestamp));

        fs::create_dir_all(&session_root)
            .map_err(|e| SessionDirError::CannotCreateDir(e))?;

        let log_file_path = session_root.join(format!("{}.log", exec_name));

        Ok(Session {
            session_root,
            log_file_path
        })
    }

    /// Exit the session.
    pub fn exit(self) {
        info!(
            "Session ended after {:.3} s, logs in {:?}",
            get_elapsed_seconds(),
            self.session_root
        );
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// Returns zero if no session has been started yet.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => {
            let elapsed = Utc::now() - *e;
            match time::duration_to_seconds(elapsed) {
                Some(s) => s,
                None => std::f64::NAN
            }
        },
        None => 0.0
    }
}

/// Return a reference to the session's epoch, if a session has been started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}
