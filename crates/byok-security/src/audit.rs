//! Security audit trail.
//!
//! Every security-relevant event becomes one [`AuditEvent`], appended to an
//! [`AuditSink`] and mirrored into `tracing` at a level matching its severity.
//! Recording never fails outward: sink errors and sink panics are logged and
//! dropped so an unavailable audit store cannot break the request that
//! triggered it.
//!
//! [`JsonlAuditSink`] writes a hash-chained JSON lines file:
//! ```json
//! {"sequence":1,"previousHash":"000…","entryHash":"9f2…","id":"…","userId":"u1","eventType":"key_created",...}
//! ```
//! `entryHash = sha256(sequence | previousHash | canonical event JSON)`, so
//! edits, deletions and reordering inside the file are caught by [`verify_chain`].

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use byok_core::config::AuditConfig;
use byok_core::utils::expand_home;

use crate::redact::sanitize_error;

// ─────────────────────────────────────────────
// Event model
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    KeyCreated,
    KeyUpdated,
    KeyDeleted,
    ConnectionTestFailed,
    EncryptionFailed,
    DecryptionFailed,
    SuspiciousActivity,
}

impl AuditEventType {
    /// Fixed severity for each event type.
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::KeyCreated | AuditEventType::KeyUpdated => AuditSeverity::Medium,
            AuditEventType::KeyDeleted | AuditEventType::ConnectionTestFailed => {
                AuditSeverity::Low
            }
            AuditEventType::EncryptionFailed | AuditEventType::DecryptionFailed => {
                AuditSeverity::High
            }
            AuditEventType::SuspiciousActivity => AuditSeverity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::KeyCreated => "key_created",
            AuditEventType::KeyUpdated => "key_updated",
            AuditEventType::KeyDeleted => "key_deleted",
            AuditEventType::ConnectionTestFailed => "connection_test_failed",
            AuditEventType::EncryptionFailed => "encryption_failed",
            AuditEventType::DecryptionFailed => "decryption_failed",
            AuditEventType::SuspiciousActivity => "suspicious_activity",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One append-only audit record. Created once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    /// Sanitized human-readable description.
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event, sanitizing the message and every metadata value.
    pub fn new(
        user_id: &str,
        event_type: AuditEventType,
        message: &str,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            event_type,
            severity: event_type.severity(),
            message: sanitize_error(message),
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k, sanitize_error(&v)))
                .collect(),
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

/// In-memory sink, for tests and hosts that forward events elsewhere.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainedRecord {
    sequence: u64,
    previous_hash: String,
    entry_hash: String,
    #[serde(flatten)]
    event: serde_json::Map<String, serde_json::Value>,
}

struct ChainState {
    sequence: u64,
    last_hash: String,
}

/// Append-only JSON lines file with a SHA-256 hash chain.
pub struct JsonlAuditSink {
    path: PathBuf,
    state: Mutex<ChainState>,
}

impl JsonlAuditSink {
    /// Open (or create on first write) the log at `path`, resuming the chain
    /// from the last record already in the file.
    ///
    /// A torn tail left by an interrupted append is truncated back to the last
    /// complete record so the chain stays verifiable.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut state = ChainState {
            sequence: 0,
            last_hash: GENESIS_HASH.to_string(),
        };

        if path.exists() {
            let data = tokio::fs::read(&path).await?;
            let tail = last_record(&data);
            let keep = tail.as_ref().map_or(0, |t| t.end);

            if keep < data.len() {
                warn!(
                    path = %path.display(),
                    dropped_bytes = data.len() - keep,
                    "truncating torn audit log tail"
                );
                let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
                file.set_len(keep as u64).await?;
            }
            if let Some(tail) = tail {
                if !tail.terminated {
                    let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await?;
                    file.write_all(b"\n").await?;
                    file.flush().await?;
                }
                state.sequence = tail.record.sequence;
                state.last_hash = tail.record.entry_hash;
            }
        }

        debug!(path = %path.display(), sequence = state.sequence, "opened audit log");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct LogTail {
    record: ChainedRecord,
    /// Byte offset just past the record's line.
    end: usize,
    terminated: bool,
}

/// Last line of `data` that parses as a chained record.
fn last_record(data: &[u8]) -> Option<LogTail> {
    let mut offset = 0;
    let mut tail = None;
    for segment in data.split_inclusive(|b| *b == b'\n') {
        offset += segment.len();
        let terminated = segment.ends_with(b"\n");
        let line = segment.strip_suffix(b"\n").unwrap_or(segment);
        if let Ok(record) = serde_json::from_slice::<ChainedRecord>(line) {
            tail = Some(LogTail {
                record,
                end: offset,
                terminated,
            });
        }
    }
    tail
}

fn entry_hash(sequence: u64, previous_hash: &str, canonical_event: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(previous_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_event.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, event: &AuditEvent) -> anyhow::Result<()> {
        // serde_json maps are sorted, which makes the text canonical.
        let serde_json::Value::Object(event_fields) = serde_json::to_value(event)? else {
            anyhow::bail!("audit event did not serialize to an object");
        };
        let canonical = serde_json::to_string(&event_fields)?;

        let mut state = self.state.lock().await;
        let sequence = state.sequence + 1;
        let hash = entry_hash(sequence, &state.last_hash, &canonical);
        let record = ChainedRecord {
            sequence,
            previous_hash: state.last_hash.clone(),
            entry_hash: hash.clone(),
            event: event_fields,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).await?;
        let len_before = file.metadata().await?.len();
        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            // Roll back a partial line so the next append starts clean.
            if let Err(trunc) = file.set_len(len_before).await {
                warn!(error = %trunc, "failed to roll back partial audit record");
            }
            return Err(e.into());
        }

        state.sequence = sequence;
        state.last_hash = hash;
        Ok(())
    }
}

/// Check the hash chain of a JSON lines audit log.
///
/// Returns the number of verified records, or an error naming the first
/// record that doesn't match.
pub fn verify_chain(path: &Path) -> anyhow::Result<u64> {
    let data = std::fs::read_to_string(path)?;
    let mut expected_prev = GENESIS_HASH.to_string();
    let mut expected_seq = 1u64;

    for (idx, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ChainedRecord = serde_json::from_str(line)
            .map_err(|e| anyhow::anyhow!("line {}: unparseable record: {}", idx + 1, e))?;

        if record.sequence != expected_seq {
            anyhow::bail!(
                "line {}: expected sequence {}, found {}",
                idx + 1,
                expected_seq,
                record.sequence
            );
        }
        if record.previous_hash != expected_prev {
            anyhow::bail!("line {}: previous hash does not match", idx + 1);
        }
        let canonical = serde_json::to_string(&record.event)?;
        if entry_hash(record.sequence, &record.previous_hash, &canonical) != record.entry_hash {
            anyhow::bail!("line {}: entry hash mismatch", idx + 1);
        }

        expected_prev = record.entry_hash;
        expected_seq += 1;
    }

    Ok(expected_seq - 1)
}

// ─────────────────────────────────────────────
// Auditor
// ─────────────────────────────────────────────

/// Records security events. Cheap to clone.
#[derive(Clone)]
pub struct SecurityAuditor {
    sink: Option<Arc<dyn AuditSink>>,
}

impl SecurityAuditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Auditor that only mirrors events into tracing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// JSONL-backed auditor at `audit.logPath`, or a disabled one.
    pub async fn from_config(config: &AuditConfig) -> anyhow::Result<Self> {
        if !config.enabled {
            info!("audit trail disabled by config");
            return Ok(Self::disabled());
        }
        let sink = JsonlAuditSink::open(expand_home(&config.log_path)).await?;
        Ok(Self::new(Arc::new(sink)))
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn log_api_key_created(&self, user_id: &str, provider: &str) {
        self.record(
            user_id,
            AuditEventType::KeyCreated,
            &format!("API key created for provider {provider}"),
            provider_meta(provider),
        )
        .await;
    }

    pub async fn log_api_key_updated(&self, user_id: &str, provider: &str) {
        self.record(
            user_id,
            AuditEventType::KeyUpdated,
            &format!("API key updated for provider {provider}"),
            provider_meta(provider),
        )
        .await;
    }

    pub async fn log_api_key_deleted(&self, user_id: &str, provider: &str) {
        self.record(
            user_id,
            AuditEventType::KeyDeleted,
            &format!("API key deleted for provider {provider}"),
            provider_meta(provider),
        )
        .await;
    }

    pub async fn log_connection_test_failed(&self, user_id: &str, provider: &str, error: &str) {
        let mut metadata = provider_meta(provider);
        metadata.insert("error".to_string(), error.to_string());
        self.record(
            user_id,
            AuditEventType::ConnectionTestFailed,
            &format!("Connection test failed for provider {provider}"),
            metadata,
        )
        .await;
    }

    pub async fn log_encryption_failed(&self, user_id: &str, error: &str) {
        self.record(
            user_id,
            AuditEventType::EncryptionFailed,
            &format!("API key encryption failed: {error}"),
            BTreeMap::new(),
        )
        .await;
    }

    pub async fn log_decryption_failed(&self, user_id: &str, error: &str) {
        self.record(
            user_id,
            AuditEventType::DecryptionFailed,
            &format!("API key decryption failed: {error}"),
            BTreeMap::new(),
        )
        .await;
    }

    pub async fn log_suspicious_activity(
        &self,
        user_id: &str,
        description: &str,
        metadata: BTreeMap<String, String>,
    ) {
        self.record(
            user_id,
            AuditEventType::SuspiciousActivity,
            description,
            metadata,
        )
        .await;
    }

    async fn record(
        &self,
        user_id: &str,
        event_type: AuditEventType,
        message: &str,
        metadata: BTreeMap<String, String>,
    ) {
        let event = AuditEvent::new(user_id, event_type, message, metadata);
        mirror_to_tracing(&event);

        let Some(sink) = &self.sink else {
            return;
        };
        match AssertUnwindSafe(sink.append(&event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                event_type = event.event_type.as_str(),
                error = %sanitize_error(&e.to_string()),
                "failed to write audit event"
            ),
            Err(_) => error!(
                event_type = event.event_type.as_str(),
                "audit sink panicked while writing event"
            ),
        }
    }
}

fn provider_meta(provider: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("provider".to_string(), provider.to_string())])
}

fn mirror_to_tracing(event: &AuditEvent) {
    let event_type = event.event_type.as_str();
    let user_id = event.user_id.as_str();
    let message = event.message.as_str();
    match event.severity {
        AuditSeverity::Low => debug!(target: "byok::audit", event_type, user_id, "{message}"),
        AuditSeverity::Medium => info!(target: "byok::audit", event_type, user_id, "{message}"),
        AuditSeverity::High => warn!(target: "byok::audit", event_type, user_id, "{message}"),
        AuditSeverity::Critical => error!(target: "byok::audit", event_type, user_id, "{message}"),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
