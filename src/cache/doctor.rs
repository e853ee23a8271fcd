use crate::cache::records::{SessionMetadata, SessionStatus};
use crate::cache::store::{list_page_files, read_page_file, SessionCache};
use crate::cache::CacheError;
use chrono::Utc;
use std::fmt;
use std::fs;

/// One problem found in a session
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    /// `session.json` is missing or not valid JSON
    UnreadableMetadata(String),

    /// `session.json` parsed but lacks a required field
    MissingField(String),

    /// Page files exist but there is no metadata at all
    OrphanPages(usize),

    /// A page file that cannot be parsed
    CorruptPage(String),

    /// `pages_scraped` disagrees with the readable files on disk
    CountMismatch { recorded: usize, actual: usize },

    /// An active session whose heartbeat is older than the timeout
    StaleActive { hours: i64 },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnreadableMetadata(e) => write!(f, "unreadable session.json: {}", e),
            Self::MissingField(field) => write!(f, "session.json missing field '{}'", field),
            Self::OrphanPages(n) => write!(f, "{} page file(s) with no session metadata", n),
            Self::CorruptPage(name) => write!(f, "corrupt page file {}", name),
            Self::CountMismatch { recorded, actual } => {
                write!(f, "pages_scraped is {} but {} readable page file(s) exist", recorded, actual)
            }
            Self::StaleActive { hours } => {
                write!(f, "active session untouched for {}h", hours)
            }
        }
    }
}

/// Diagnostics for one session
#[derive(Debug)]
pub struct SessionDiagnosis {
    pub session_id: String,
    pub status: Option<SessionStatus>,
    pub issues: Vec<Issue>,
    pub readable_pages: usize,
    /// A terminal session with missing or corrupt pages: reported as
    /// "partial" but never persisted as a status
    pub partial: bool,
}

impl SessionDiagnosis {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of a doctor pass over the whole cache
#[derive(Debug)]
pub struct DoctorReport {
    pub sessions: Vec<SessionDiagnosis>,
    /// Whether repairs were applied (fix mode, not a dry run)
    pub repaired: bool,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.sessions.iter().all(|s| s.is_healthy())
    }

    pub fn issue_count(&self) -> usize {
        self.sessions.iter().map(|s| s.issues.len()).sum()
    }
}

/// Scans every session and reports (optionally repairing) inconsistencies
///
/// With `fix` set, corrupt page files are removed, `pages_scraped` is
/// reconciled against the files actually on disk, and stale active sessions
/// are re-statused to failed. Applying the fix twice yields the same on-disk
/// state as applying it once. With `dry_run` the report is produced without
/// any mutation even when `fix` is set.
pub fn doctor(
    cache: &SessionCache,
    fix: bool,
    dry_run: bool,
    session_timeout_hours: u32,
) -> Result<DoctorReport, CacheError> {
    let mutate = fix && !dry_run;
    let mut sessions = Vec::new();

    let sessions_dir = cache.sessions_dir();
    if !sessions_dir.exists() {
        return Ok(DoctorReport {
            sessions,
            repaired: mutate,
        });
    }

    let mut ids: Vec<String> = fs::read_dir(&sessions_dir)?
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    ids.sort();

    for id in ids {
        sessions.push(diagnose_session(cache, &id, mutate, session_timeout_hours)?);
    }

    Ok(DoctorReport {
        sessions,
        repaired: mutate,
    })
}

fn diagnose_session(
    cache: &SessionCache,
    session_id: &str,
    mutate: bool,
    session_timeout_hours: u32,
) -> Result<SessionDiagnosis, CacheError> {
    let dir = cache.session_dir(session_id);
    let pages_dir = dir.join("pages");
    let mut issues = Vec::new();

    // Survey page files first; every later check needs the readable count.
    let mut readable = 0;
    let mut corrupt_files = Vec::new();
    for (_, path) in list_page_files(&pages_dir)? {
        match read_page_file(&path) {
            Ok(_) => readable += 1,
            Err(_) => corrupt_files.push(path),
        }
    }

    for path in &corrupt_files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        issues.push(Issue::CorruptPage(name));
    }

    // Metadata: read leniently so field-level problems are reportable.
    let metadata_path = dir.join("session.json");
    let metadata: Option<SessionMetadata> = if !metadata_path.exists() {
        let total = readable + corrupt_files.len();
        if total > 0 {
            issues.push(Issue::OrphanPages(total));
        } else {
            issues.push(Issue::UnreadableMetadata("file missing".to_string()));
        }
        None
    } else {
        match fs::read(&metadata_path)
            .map_err(CacheError::from)
            .and_then(|raw| Ok(serde_json::from_slice::<serde_json::Value>(&raw)?))
        {
            Ok(value) => {
                for field in SessionMetadata::REQUIRED_FIELDS {
                    if value.get(field).is_none() {
                        issues.push(Issue::MissingField(field.to_string()));
                    }
                }
                serde_json::from_value(value).ok()
            }
            Err(e) => {
                issues.push(Issue::UnreadableMetadata(e.to_string()));
                None
            }
        }
    };

    let mut status = metadata.as_ref().map(|m| m.status);

    if let Some(meta) = &metadata {
        if meta.pages_scraped != readable {
            issues.push(Issue::CountMismatch {
                recorded: meta.pages_scraped,
                actual: readable,
            });
        }

        if meta.status == SessionStatus::Active {
            let age = Utc::now() - meta.last_modified;
            if age > chrono::Duration::hours(session_timeout_hours as i64) {
                issues.push(Issue::StaleActive {
                    hours: age.num_hours(),
                });
            }
        }
    }

    let partial = matches!(status, Some(s) if s.is_terminal())
        && (!corrupt_files.is_empty()
            || metadata
                .as_ref()
                .map(|m| m.pages_scraped > readable)
                .unwrap_or(false));

    if mutate {
        for path in &corrupt_files {
            tracing::warn!("doctor: removing corrupt page file {}", path.display());
            fs::remove_file(path)?;
        }

        if let Some(mut meta) = metadata {
            let stale = issues
                .iter()
                .any(|i| matches!(i, Issue::StaleActive { .. }));
            let mismatch = meta.pages_scraped != readable;

            if mismatch {
                tracing::warn!(
                    "doctor: reconciling {} pages_scraped {} -> {}",
                    session_id,
                    meta.pages_scraped,
                    readable
                );
                meta.pages_scraped = readable;
            }

            if stale {
                tracing::warn!("doctor: failing stale active session {}", session_id);
                meta.status = SessionStatus::Failed;
                meta.failure_reason = Some("stale".to_string());
                status = Some(SessionStatus::Failed);
            }

            if mismatch || stale || !corrupt_files.is_empty() {
                meta.last_modified = Utc::now();
                let json = serde_json::to_vec_pretty(&meta)?;
                let tmp = dir.join(".session.json.tmp");
                fs::write(&tmp, &json)?;
                fs::rename(&tmp, &metadata_path)?;
            }
        }
    }

    Ok(SessionDiagnosis {
        session_id: session_id.to_string(),
        status,
        issues,
        readable_pages: readable,
        partial,
    })
}
