//! In-memory store, sink, and source doubles.
//!
//! These mirror the Postgres repositories' conditional-update semantics
//! closely enough that the scanner, worker, and operations can be
//! exercised without a database. [`MemoryFileStore`] additionally tracks
//! the high-water mark of concurrently in-flight files so tests can assert
//! the single-lane guarantee.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

use chanvault_core::models::{
    Channel, CredentialSession, FileRecord, FileStatus, NewFile,
};
use chanvault_core::PipelineError;
use chanvault_db::{ChannelStore, FileStats, FileStore, SessionStore, StatusFilter};
use chanvault_source::{
    AuthOutcome, ByteStream, ChannelInfo, MessageSource, SourceError, SourceMessage,
};
use chanvault_storage::{ObjectSink, StorageError, StorageResult};

// File store

#[derive(Default)]
struct FileStoreInner {
    files: HashMap<i64, FileRecord>,
    next_id: i64,
    in_flight: i64,
    max_in_flight: i64,
    transition_failures: u32,
}

#[derive(Default)]
pub struct MemoryFileStore {
    inner: Mutex<FileStoreInner>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of files simultaneously in flight so far.
    pub fn max_in_flight(&self) -> i64 {
        self.inner.lock().unwrap().max_in_flight
    }

    /// Make the next `transition` call fail as if the database were
    /// unreachable. The status is left untouched.
    pub fn fail_next_transition(&self) {
        self.inner.lock().unwrap().transition_failures += 1;
    }

    /// Force a status directly, bypassing transition checks. For setting
    /// up scenarios like stale in-flight rows.
    pub fn force_status(&self, id: i64, status: FileStatus) {
        let mut inner = self.inner.lock().unwrap();
        let was_in_flight;
        let now_in_flight;
        {
            let file = inner.files.get_mut(&id).unwrap();
            was_in_flight = file.status.is_in_flight();
            file.status = status;
            if status == FileStatus::Queued && file.queued_at.is_none() {
                file.queued_at = Some(Utc::now());
            }
            now_in_flight = status.is_in_flight();
        }
        track_in_flight(&mut inner, was_in_flight, now_in_flight);
    }
}

fn track_in_flight(inner: &mut FileStoreInner, was: bool, now: bool) {
    match (was, now) {
        (false, true) => {
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
        }
        (true, false) => inner.in_flight -= 1,
        _ => {}
    }
}

fn matches_filter(status: FileStatus, filter: StatusFilter) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Active => {
            matches!(
                status,
                FileStatus::Queued | FileStatus::Downloading | FileStatus::Uploading
            )
        }
        StatusFilter::Status(s) => status == s,
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn insert_discovered(&self, file: NewFile) -> Result<Option<FileRecord>> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner
            .files
            .values()
            .any(|f| f.channel_id == file.channel_id && f.message_id == file.message_id);
        if duplicate {
            return Ok(None);
        }

        inner.next_id += 1;
        let now = Utc::now();
        let record = FileRecord {
            id: inner.next_id,
            channel_id: file.channel_id,
            message_id: file.message_id,
            file_name: file.file_name,
            file_size: file.file_size,
            kind: file.kind,
            mime_type: file.mime_type,
            status: FileStatus::Pending,
            bucket: file.bucket,
            object_key: file.object_key,
            retry_count: 0,
            error_message: None,
            queued_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.files.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn get(&self, id: i64) -> Result<Option<FileRecord>> {
        Ok(self.inner.lock().unwrap().files.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: StatusFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut matched: Vec<FileRecord> = inner
            .files
            .values()
            .filter(|f| matches_filter(f.status, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|f| std::cmp::Reverse(f.id));
        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn transition(&self, id: i64, from: FileStatus, to: FileStatus) -> Result<FileRecord> {
        if !from.can_transition(to) {
            return Err(PipelineError::InvalidTransition { file_id: id, from, to }.into());
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.transition_failures > 0 {
            inner.transition_failures -= 1;
            return Err(anyhow::anyhow!("simulated store outage"));
        }
        let current = match inner.files.get(&id) {
            Some(f) => f.status,
            None => return Err(PipelineError::FileNotFound(id).into()),
        };
        if current != from {
            return Err(PipelineError::InvalidTransition {
                file_id: id,
                from: current,
                to,
            }
            .into());
        }

        let record = {
            let file = inner.files.get_mut(&id).unwrap();
            file.status = to;
            file.updated_at = Utc::now();
            if to == FileStatus::Queued {
                file.queued_at = Some(Utc::now());
                file.error_message = None;
            }
            file.clone()
        };
        track_in_flight(&mut inner, from.is_in_flight(), to.is_in_flight());
        Ok(record)
    }

    async fn approve_all(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut approved = 0u64;
        for file in inner.files.values_mut() {
            if file.status == FileStatus::Pending {
                file.status = FileStatus::Queued;
                file.queued_at = Some(Utc::now());
                file.updated_at = Utc::now();
                approved += 1;
            }
        }
        Ok(approved)
    }

    async fn claim_next(&self) -> Result<Option<FileRecord>> {
        let mut inner = self.inner.lock().unwrap();
        // One file in flight at a time, same as the repository's guarded
        // claim.
        if inner.in_flight > 0 {
            return Ok(None);
        }
        let next_id = inner
            .files
            .values()
            .filter(|f| f.status == FileStatus::Queued)
            .min_by_key(|f| (f.queued_at, f.id))
            .map(|f| f.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let record = {
            let file = inner.files.get_mut(&id).unwrap();
            file.status = FileStatus::Downloading;
            file.updated_at = Utc::now();
            file.clone()
        };
        track_in_flight(&mut inner, false, true);
        Ok(Some(record))
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> Result<FileRecord> {
        let mut inner = self.inner.lock().unwrap();
        let current = match inner.files.get(&id) {
            Some(f) => f.status,
            None => return Err(PipelineError::FileNotFound(id).into()),
        };
        if !current.is_in_flight() {
            return Err(PipelineError::InvalidTransition {
                file_id: id,
                from: current,
                to: FileStatus::Failed,
            }
            .into());
        }

        let record = {
            let file = inner.files.get_mut(&id).unwrap();
            file.status = FileStatus::Failed;
            file.error_message = Some(reason.to_string());
            file.updated_at = Utc::now();
            file.clone()
        };
        track_in_flight(&mut inner, true, false);
        Ok(record)
    }

    async fn record_attempts(&self, id: i64, attempts: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.files.get_mut(&id) {
            Some(file) => {
                file.retry_count += attempts;
                Ok(())
            }
            None => Err(PipelineError::FileNotFound(id).into()),
        }
    }

    async fn reset_stale_inflight(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut reset = 0u64;
        for file in inner.files.values_mut() {
            if file.status.is_in_flight() {
                file.status = FileStatus::Queued;
                file.queued_at = Some(Utc::now());
                file.error_message = None;
                file.updated_at = Utc::now();
                reset += 1;
            }
        }
        inner.in_flight = 0;
        Ok(reset)
    }

    async fn stats(&self) -> Result<FileStats> {
        let inner = self.inner.lock().unwrap();
        let mut stats = FileStats::default();
        for file in inner.files.values() {
            match file.status {
                FileStatus::Pending => stats.pending += 1,
                FileStatus::Queued | FileStatus::Downloading | FileStatus::Uploading => {
                    stats.active += 1
                }
                FileStatus::Completed => stats.completed += 1,
                FileStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

// Channel store

#[derive(Default)]
pub struct MemoryChannelStore {
    channels: Mutex<HashMap<i64, Channel>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self, id: i64) -> Option<i64> {
        self.channels
            .lock()
            .unwrap()
            .get(&id)
            .map(|c| c.last_scanned_message_id)
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn list(&self, active_only: bool) -> Result<Vec<Channel>> {
        let channels = self.channels.lock().unwrap();
        let mut listed: Vec<Channel> = channels
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        listed.sort_by_key(|c| c.id);
        Ok(listed)
    }

    async fn get(&self, id: i64) -> Result<Option<Channel>> {
        Ok(self.channels.lock().unwrap().get(&id).cloned())
    }

    async fn upsert(&self, id: i64, name: Option<&str>, handle: Option<&str>) -> Result<Channel> {
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .entry(id)
            .and_modify(|c| {
                c.name = name.map(String::from);
                c.handle = handle.map(String::from);
                c.is_active = true;
            })
            .or_insert_with(|| Channel {
                id,
                name: name.map(String::from),
                handle: handle.map(String::from),
                last_scanned_message_id: 0,
                is_active: true,
                added_at: Utc::now(),
            });
        Ok(channel.clone())
    }

    async fn deactivate(&self, id: i64) -> Result<()> {
        match self.channels.lock().unwrap().get_mut(&id) {
            Some(channel) => {
                channel.is_active = false;
                Ok(())
            }
            None => Err(PipelineError::ChannelNotFound(id).into()),
        }
    }

    async fn advance_cursor(&self, id: i64, position: i64) -> Result<()> {
        match self.channels.lock().unwrap().get_mut(&id) {
            Some(channel) => {
                // Monotonic, same as the GREATEST() in the repository.
                channel.last_scanned_message_id = channel.last_scanned_message_id.max(position);
                Ok(())
            }
            None => Err(PipelineError::ChannelNotFound(id).into()),
        }
    }
}

// Session store

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, CredentialSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(slot: &str, payload: &[u8]) -> Self {
        let store = Self::default();
        let now = Utc::now();
        store.sessions.lock().unwrap().insert(
            slot.to_string(),
            CredentialSession {
                slot: slot.to_string(),
                payload: payload.to_vec(),
                created_at: now,
                updated_at: now,
            },
        );
        store
    }

    pub fn payload(&self, slot: &str) -> Option<Vec<u8>> {
        self.sessions
            .lock()
            .unwrap()
            .get(slot)
            .map(|s| s.payload.clone())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, slot: &str) -> Result<Option<CredentialSession>> {
        Ok(self.sessions.lock().unwrap().get(slot).cloned())
    }

    async fn save(&self, slot: &str, payload: &[u8]) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let now = Utc::now();
        sessions
            .entry(slot.to_string())
            .and_modify(|s| {
                s.payload = payload.to_vec();
                s.updated_at = now;
            })
            .or_insert_with(|| CredentialSession {
                slot: slot.to_string(),
                payload: payload.to_vec(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn invalidate(&self, slot: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(slot);
        Ok(())
    }
}

// Object sink

#[derive(Default)]
pub struct MemorySink {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    put_failures: Mutex<VecDeque<StorageError>>,
    put_calls: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for an upcoming `put` call. Errors are consumed in
    /// order before any successful upload.
    pub fn push_put_failure(&self, error: StorageError) {
        self.put_failures.lock().unwrap().push_back(error);
    }

    pub fn seed_object(&self, bucket: &str, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_calls(&self) -> u64 {
        *self.put_calls.lock().unwrap()
    }

    pub fn remove_object(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
    }
}

#[async_trait]
impl ObjectSink for MemorySink {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        _size: u64,
    ) -> StorageResult<()> {
        *self.put_calls.lock().unwrap() += 1;
        if let Some(error) = self.put_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.remove_object(bucket, key);
        Ok(())
    }
}

// Message source

#[derive(Default)]
struct MockSourceInner {
    messages: HashMap<i64, Vec<SourceMessage>>,
    payloads: HashMap<(i64, i64), Vec<u8>>,
    download_failures: VecDeque<SourceError>,
    list_failures: VecDeque<SourceError>,
    resolvable: HashMap<String, ChannelInfo>,
    restore_accepts: bool,
    accept_code: Option<String>,
    password: Option<String>,
    session_payload: Vec<u8>,
    list_calls: u64,
}

/// Scripted message source. Failures queued with `fail_next_download` /
/// `fail_next_list` are consumed one per call, before the scripted
/// success.
#[derive(Default)]
pub struct MockSource {
    inner: Mutex<MockSourceInner>,
}

impl MockSource {
    pub fn new() -> Self {
        let source = Self::default();
        {
            let mut inner = source.inner.lock().unwrap();
            inner.restore_accepts = true;
            inner.session_payload = b"mock-session".to_vec();
        }
        source
    }

    pub fn add_message(&self, message: SourceMessage) {
        self.inner
            .lock()
            .unwrap()
            .messages
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    pub fn set_payload(&self, channel_id: i64, message_id: i64, payload: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .payloads
            .insert((channel_id, message_id), payload.to_vec());
    }

    pub fn fail_next_download(&self, error: SourceError) {
        self.inner
            .lock()
            .unwrap()
            .download_failures
            .push_back(error);
    }

    pub fn fail_next_list(&self, error: SourceError) {
        self.inner.lock().unwrap().list_failures.push_back(error);
    }

    pub fn add_resolvable(&self, identifier: &str, info: ChannelInfo) {
        self.inner
            .lock()
            .unwrap()
            .resolvable
            .insert(identifier.to_string(), info);
    }

    pub fn reject_restore(&self) {
        self.inner.lock().unwrap().restore_accepts = false;
    }

    /// Script interactive auth: the code that will be accepted and,
    /// optionally, the second-factor secret the account requires.
    pub fn script_login(&self, code: &str, password: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        inner.accept_code = Some(code.to_string());
        inner.password = password.map(String::from);
    }

    pub fn list_calls(&self) -> u64 {
        self.inner.lock().unwrap().list_calls
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn restore_session(&self, _payload: &[u8]) -> Result<(), SourceError> {
        if self.inner.lock().unwrap().restore_accepts {
            Ok(())
        } else {
            Err(SourceError::AuthRequired)
        }
    }

    async fn request_login_code(&self, _phone: &str) -> Result<(), SourceError> {
        Ok(())
    }

    async fn submit_code(&self, code: &str) -> Result<AuthOutcome, SourceError> {
        let inner = self.inner.lock().unwrap();
        match &inner.accept_code {
            Some(expected) if expected == code => {
                if inner.password.is_some() {
                    Ok(AuthOutcome::PasswordNeeded)
                } else {
                    Ok(AuthOutcome::Session(inner.session_payload.clone()))
                }
            }
            _ => Err(SourceError::InvalidCode),
        }
    }

    async fn submit_password(&self, password: &str) -> Result<Vec<u8>, SourceError> {
        let inner = self.inner.lock().unwrap();
        match &inner.password {
            Some(expected) if expected == password => Ok(inner.session_payload.clone()),
            _ => Err(SourceError::InvalidCode),
        }
    }

    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelInfo, SourceError> {
        self.inner
            .lock()
            .unwrap()
            .resolvable
            .get(identifier)
            .cloned()
            .ok_or_else(|| SourceError::ChannelUnavailable(identifier.to_string()))
    }

    async fn list_messages(
        &self,
        channel_id: i64,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls += 1;
        if let Some(error) = inner.list_failures.pop_front() {
            return Err(error);
        }

        let mut page: Vec<SourceMessage> = inner
            .messages
            .get(&channel_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| m.message_id > after_position)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        page.sort_by_key(|m| m.message_id);
        page.truncate(limit);
        Ok(page)
    }

    async fn download(&self, channel_id: i64, message_id: i64) -> Result<ByteStream, SourceError> {
        let payload = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.download_failures.pop_front() {
                return Err(error);
            }
            inner
                .payloads
                .get(&(channel_id, message_id))
                .cloned()
                .ok_or_else(|| {
                    SourceError::NotFound(format!("{}/{}", channel_id, message_id))
                })?
        };

        let chunks: Vec<Result<Bytes, SourceError>> = payload
            .chunks(16)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
