use crate::cache::records::{PageRecord, PreviewSession, SessionMetadata, SessionStatus};
use crate::cache::CacheError;
use crate::config::CacheConfig;
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A loaded session: metadata plus the page records that were readable
#[derive(Debug)]
pub struct LoadedSession {
    pub metadata: SessionMetadata,
    pub records: Vec<PageRecord>,
    /// Page files that existed but could not be parsed
    pub corrupt_pages: usize,
}

/// Aggregate cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub completed_sessions: usize,
    pub failed_sessions: usize,
    pub total_bytes: u64,
}

/// The on-disk session store
///
/// ```text
/// <root>/
///   sessions/<session_id>/
///     session.json                 SessionMetadata, atomic rewrite
///     pages/page_NNNNNN.json[.gz]  PageRecord, monotonic index
///     temp/                        downloaded image bodies
///   previews/<preview_id>/
///     preview.json                 PreviewSession
/// ```
///
/// A session is written by exactly one `SessionWriter` at a time; readers
/// snapshot the page index range at open and ignore later additions.
#[derive(Debug, Clone)]
pub struct SessionCache {
    root: PathBuf,
    compression: bool,
    compression_level: u32,
    save_frequency: usize,
    max_sessions: usize,
}

impl SessionCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            root: PathBuf::from(&config.directory),
            compression: config.compression,
            compression_level: config.compression_level,
            save_frequency: config.save_frequency.max(1),
            max_sessions: config.max_sessions,
        }
    }

    /// A cache rooted at an explicit directory; used heavily by tests
    pub fn at_root(root: impl Into<PathBuf>, compression: bool) -> Self {
        Self {
            root: root.into(),
            compression,
            compression_level: 6,
            save_frequency: 1,
            max_sessions: 50,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.root.join("previews")
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(session_id)
    }

    /// Creates a new session directory and its initial metadata
    ///
    /// The session id is derived from the seed host, the wall clock, and the
    /// config digest, e.g. `docs_example_org_20250114_093012_3fa82c1d`.
    pub fn create_session(
        &self,
        base_url: &str,
        config_digest: &str,
        exclude_patterns: &[String],
    ) -> Result<SessionWriter, CacheError> {
        let existing = self.list_sessions().len();
        if existing >= self.max_sessions {
            tracing::warn!(
                "Cache holds {} sessions (limit {}); consider `cache clean`",
                existing,
                self.max_sessions
            );
        }

        let host = crate::url::extract_host(base_url).unwrap_or_else(|_| "site".to_string());
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let digest8 = &config_digest[..config_digest.len().min(8)];
        let base_id = format!("{}_{}_{}", host.replace('.', "_"), stamp, digest8);

        // Same host + same second: disambiguate with a numeric suffix
        let mut session_id = base_id.clone();
        let mut n = 1;
        while self.session_dir(&session_id).exists() {
            n += 1;
            session_id = format!("{}-{}", base_id, n);
        }

        let dir = self.session_dir(&session_id);
        fs::create_dir_all(dir.join("pages"))?;

        let now = Utc::now();
        let metadata = SessionMetadata {
            session_id: session_id.clone(),
            base_url: base_url.to_string(),
            status: SessionStatus::Active,
            created_at: now,
            last_modified: now,
            pages_scraped: 0,
            config_hash: config_digest.to_string(),
            exclude_patterns: exclude_patterns.to_vec(),
            cache_size: 0,
            failure_reason: None,
        };

        write_metadata(&dir, &metadata)?;
        tracing::info!("Created cache session {}", session_id);

        Ok(SessionWriter {
            dir,
            metadata,
            next_index: 1,
            compression: self.compression,
            compression_level: self.compression_level,
            save_frequency: self.save_frequency,
            unsaved_commits: 0,
        })
    }

    /// Reopens a session for resumption
    ///
    /// Returns the writer (status flipped back to active, page count
    /// reconciled against the files actually on disk) and the records that
    /// were already persisted.
    pub fn resume_session(
        &self,
        session_id: &str,
    ) -> Result<(SessionWriter, Vec<PageRecord>), CacheError> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Err(CacheError::SessionNotFound(session_id.to_string()));
        }

        let loaded = self.load_session(session_id)?;
        let next_index = list_page_files(&dir.join("pages"))?
            .last()
            .map(|(index, _)| index + 1)
            .unwrap_or(1);

        let mut metadata = loaded.metadata;
        metadata.status = SessionStatus::Active;
        metadata.failure_reason = None;
        metadata.pages_scraped = loaded.records.len();
        metadata.last_modified = Utc::now();

        write_metadata(&dir, &metadata)?;
        tracing::info!(
            "Resuming session {} with {} cached pages",
            session_id,
            loaded.records.len()
        );

        Ok((
            SessionWriter {
                dir,
                metadata,
                next_index,
                compression: self.compression,
                compression_level: self.compression_level,
                save_frequency: self.save_frequency,
                unsaved_commits: 0,
            },
            loaded.records,
        ))
    }

    pub fn load_metadata(&self, session_id: &str) -> Result<SessionMetadata, CacheError> {
        let path = self.session_dir(session_id).join("session.json");
        if !path.exists() {
            return Err(CacheError::SessionNotFound(session_id.to_string()));
        }
        let metadata: SessionMetadata = serde_json::from_slice(&fs::read(&path)?)?;
        Ok(metadata)
    }

    /// Loads a session's metadata and page records in index order
    ///
    /// The page file listing is snapshotted once; files appended by a
    /// concurrent writer after this call starts are not observed. Corrupt
    /// page files are skipped, logged, and counted.
    pub fn load_session(&self, session_id: &str) -> Result<LoadedSession, CacheError> {
        let metadata = self.load_metadata(session_id)?;
        let pages_dir = self.session_dir(session_id).join("pages");

        let mut records = Vec::new();
        let mut corrupt = 0;

        if pages_dir.exists() {
            for (_, path) in list_page_files(&pages_dir)? {
                match read_page_file(&path) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!("Skipping corrupt page file {}: {}", path.display(), e);
                        corrupt += 1;
                    }
                }
            }
        }

        Ok(LoadedSession {
            metadata,
            records,
            corrupt_pages: corrupt,
        })
    }

    /// Lists all sessions, newest first; unreadable ones are skipped
    pub fn list_sessions(&self) -> Vec<SessionMetadata> {
        let mut sessions = Vec::new();
        let Ok(entries) = fs::read_dir(self.sessions_dir()) else {
            return sessions;
        };

        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load_metadata(&id) {
                Ok(metadata) => sessions.push(metadata),
                Err(e) => tracing::warn!("Skipping unreadable session {}: {}", id, e),
            }
        }

        sessions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        sessions
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), CacheError> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Err(CacheError::SessionNotFound(session_id.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        tracing::info!("Deleted session {}", session_id);
        Ok(())
    }

    /// Flips a session's status out-of-band (doctor, CLI)
    pub fn set_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), CacheError> {
        let dir = self.session_dir(session_id);
        let mut metadata = self.load_metadata(session_id)?;
        metadata.status = status;
        metadata.failure_reason = reason.map(str::to_string);
        metadata.last_modified = Utc::now();
        write_metadata(&dir, &metadata)
    }

    /// Removes old sessions, keeping the most recent completed ones
    ///
    /// Returns the ids that were removed (or would be, in dry-run mode).
    pub fn cleanup(
        &self,
        max_age_days: u32,
        keep_completed: usize,
        dry_run: bool,
    ) -> Result<Vec<String>, CacheError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days as i64);
        let sessions = self.list_sessions();

        // list_sessions is newest-first, so the first keep_completed
        // completed sessions are the ones to preserve.
        let keep: std::collections::HashSet<String> = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .take(keep_completed)
            .map(|s| s.session_id.clone())
            .collect();

        let mut removed = Vec::new();
        for session in &sessions {
            if keep.contains(&session.session_id) {
                continue;
            }
            if session.last_modified < cutoff {
                if !dry_run {
                    self.delete_session(&session.session_id)?;
                }
                removed.push(session.session_id.clone());
            }
        }

        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let sessions = self.list_sessions();
        let mut stats = CacheStats {
            total_sessions: sessions.len(),
            ..Default::default()
        };

        for session in &sessions {
            match session.status {
                SessionStatus::Active => stats.active_sessions += 1,
                SessionStatus::Completed => stats.completed_sessions += 1,
                SessionStatus::Failed => stats.failed_sessions += 1,
            }
            stats.total_bytes += dir_size(&self.session_dir(&session.session_id));
        }

        stats
    }

    /// Finds an active session matching this seed and config digest
    pub fn find_compatible(&self, base_url: &str, config_digest: &str) -> Option<String> {
        self.list_sessions()
            .into_iter()
            .find(|s| {
                s.status == SessionStatus::Active
                    && s.base_url == base_url
                    && s.config_hash == config_digest
            })
            .map(|s| s.session_id)
    }

    /// Loads a preview artifact produced by the external preview step
    pub fn load_preview(&self, preview_id: &str) -> Result<PreviewSession, CacheError> {
        let path = self.previews_dir().join(preview_id).join("preview.json");
        if !path.exists() {
            return Err(CacheError::SessionNotFound(preview_id.to_string()));
        }
        let preview: PreviewSession = serde_json::from_slice(&fs::read(&path)?)?;
        Ok(preview)
    }
}

/// Exclusive handle for appending pages to one session
///
/// Single-writer ownership is the concurrency discipline: holding the writer
/// is holding the session. Terminal transitions consume it.
#[derive(Debug)]
pub struct SessionWriter {
    dir: PathBuf,
    metadata: SessionMetadata,
    next_index: usize,
    compression: bool,
    compression_level: u32,
    save_frequency: usize,
    unsaved_commits: usize,
}

impl SessionWriter {
    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn page_count(&self) -> usize {
        self.metadata.pages_scraped
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory for downloaded image bodies, created on first use
    pub fn temp_dir(&self) -> Result<PathBuf, CacheError> {
        let dir = self.dir.join("temp");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Persists one page record
    ///
    /// The record file is written to a temp name in the pages directory,
    /// fsynced, and renamed into place; then `session.json` is rewritten the
    /// same way. Indices are strictly increasing and never reused.
    pub fn append_page(&mut self, record: &PageRecord) -> Result<(), CacheError> {
        let suffix = if self.compression { ".json.gz" } else { ".json" };
        let name = format!("page_{:06}{}", self.next_index, suffix);
        let path = self.dir.join("pages").join(&name);

        let json = serde_json::to_vec_pretty(record)?;
        let bytes = if self.compression {
            let mut encoder =
                GzEncoder::new(Vec::new(), Compression::new(self.compression_level));
            encoder.write_all(&json)?;
            encoder.finish()?
        } else {
            json
        };

        write_atomic(&path, &bytes)?;
        tracing::debug!("Cached page {} as {}", record.url, name);

        self.next_index += 1;
        self.metadata.pages_scraped += 1;
        self.metadata.cache_size += bytes.len() as u64;
        self.metadata.last_modified = Utc::now();

        self.unsaved_commits += 1;
        if self.unsaved_commits >= self.save_frequency {
            write_metadata(&self.dir, &self.metadata)?;
            self.unsaved_commits = 0;
        }

        Ok(())
    }

    /// Marks the session completed and consumes the writer
    pub fn mark_complete(mut self) -> Result<SessionMetadata, CacheError> {
        self.metadata.status = SessionStatus::Completed;
        self.metadata.failure_reason = None;
        self.metadata.last_modified = Utc::now();
        write_metadata(&self.dir, &self.metadata)?;
        tracing::info!("Session {} completed", self.metadata.session_id);
        Ok(self.metadata)
    }

    /// Marks the session failed with a reason and consumes the writer
    pub fn mark_failed(mut self, reason: &str) -> Result<SessionMetadata, CacheError> {
        self.metadata.status = SessionStatus::Failed;
        self.metadata.failure_reason = Some(reason.to_string());
        self.metadata.last_modified = Utc::now();
        write_metadata(&self.dir, &self.metadata)?;
        tracing::info!(
            "Session {} failed: {}",
            self.metadata.session_id,
            reason
        );
        Ok(self.metadata)
    }
}

/// Writes bytes to a sibling temp file, fsyncs, and renames into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_metadata(session_dir: &Path, metadata: &SessionMetadata) -> Result<(), CacheError> {
    let json = serde_json::to_vec_pretty(metadata)?;
    write_atomic(&session_dir.join("session.json"), &json)
}

/// Page files of a session, sorted by index
pub(crate) fn list_page_files(pages_dir: &Path) -> Result<Vec<(usize, PathBuf)>, CacheError> {
    let mut files = Vec::new();
    if !pages_dir.exists() {
        return Ok(files);
    }

    for entry in fs::read_dir(pages_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(index) = parse_page_index(&name) {
            files.push((index, entry.path()));
        }
    }

    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

/// Parses `page_NNNNNN.json` / `page_NNNNNN.json.gz` names
pub(crate) fn parse_page_index(name: &str) -> Option<usize> {
    let rest = name.strip_prefix("page_")?;
    let digits = rest
        .strip_suffix(".json.gz")
        .or_else(|| rest.strip_suffix(".json"))?;
    if digits.len() != 6 {
        return None;
    }
    digits.parse().ok()
}

/// Reads a page record, transparently decoding gzip by suffix
pub(crate) fn read_page_file(path: &Path) -> Result<PageRecord, CacheError> {
    let raw = fs::read(path)?;
    let json = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let mut decoder = GzDecoder::new(&raw[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        out
    } else {
        raw
    };
    Ok(serde_json::from_slice(&json)?)
}

/// Total size in bytes of all files under a directory
pub(crate) fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            total += dir_size(&path);
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}
