//! JSON-lines message log: one serialized record per line.
//!
//! The whole log is loaded into memory at open and kept ordered per
//! conversation; content-type rewrites persist by rewriting the file.
//! This is the reference store for the CLI — the host application's real
//! relational store stays behind the same [`MessageLog`] contract.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::decode::extract_attachments;
use crate::error::{Result, SweepError};
use crate::model::{AttachmentDescriptor, ContentType, RawMessage};
use crate::query::Cursor;

use super::log::{page_over, MessageLog, MessagePredicate};

/// Number of extracted attachment lists kept in the LRU cache.
const DEFAULT_CACHE_SIZE: usize = 50;

/// A message log backed by a JSON-lines file.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    conversations: RwLock<BTreeMap<String, Vec<RawMessage>>>,
    /// Extraction results per (conversation, client id); paging back and
    /// forth through a conversation must not re-walk payloads every time.
    attachment_cache: Mutex<LruCache<(String, i64), Vec<AttachmentDescriptor>>>,
}

impl FileLog {
    /// Open a log file, loading every parseable record.
    ///
    /// Unparseable lines are skipped with a warning; a missing file is an
    /// error, an empty file is an empty log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SweepError::InvalidLog(path));
        }
        let file = std::fs::File::open(&path).map_err(|e| SweepError::io(&path, e))?;

        let mut conversations: BTreeMap<String, Vec<RawMessage>> = BTreeMap::new();
        let mut skipped = 0usize;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| SweepError::io(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawMessage>(&line) {
                Ok(message) => {
                    conversations
                        .entry(message.conversation_id.clone())
                        .or_default()
                        .push(message);
                }
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "Skipping unparseable record");
                    skipped += 1;
                }
            }
        }
        for records in conversations.values_mut() {
            records.sort_by_key(|m| m.server_message_id);
        }

        debug!(
            path = %path.display(),
            conversations = conversations.len(),
            skipped,
            "Opened message log"
        );

        let cache_size =
            NonZeroUsize::new(DEFAULT_CACHE_SIZE).expect("DEFAULT_CACHE_SIZE is non-zero");
        Ok(Self {
            path,
            conversations: RwLock::new(conversations),
            attachment_cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    /// Create an empty log file (parents included) and open it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
        }
        std::fs::File::create(path).map_err(|e| SweepError::io(path, e))?;
        Self::open(path)
    }

    /// Append a record to the file and the resident index.
    pub async fn append(&self, message: RawMessage) -> Result<()> {
        let line = serde_json::to_string(&message)
            .map_err(|e| SweepError::Store(format!("serialize record: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| SweepError::io(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| SweepError::io(&self.path, e))?;

        let mut conversations = self.conversations.write().await;
        let records = conversations
            .entry(message.conversation_id.clone())
            .or_default();
        let at = records.partition_point(|m| m.server_message_id <= message.server_message_id);
        records.insert(at, message);
        Ok(())
    }

    /// Attachment descriptors for one record, via the LRU cache.
    pub async fn attachments(
        &self,
        conversation_id: &str,
        client_message_id: i64,
    ) -> Result<Vec<AttachmentDescriptor>> {
        let key = (conversation_id.to_string(), client_message_id);
        {
            let mut cache = self.attachment_cache.lock().expect("cache lock");
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let message = self
            .get_message(conversation_id, client_message_id)
            .await?
            .ok_or_else(|| {
                SweepError::Store(format!(
                    "no record {client_message_id} in conversation {conversation_id}"
                ))
            })?;
        let descriptors = extract_attachments(&message.reader());

        let mut cache = self.attachment_cache.lock().expect("cache lock");
        cache.put(key, descriptors.clone());
        Ok(descriptors)
    }

    /// Rewrite the whole file from the resident records.
    async fn persist(&self) -> Result<()> {
        let conversations = self.conversations.read().await;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file =
                std::fs::File::create(&tmp).map_err(|e| SweepError::io(&tmp, e))?;
            for records in conversations.values() {
                for message in records {
                    let line = serde_json::to_string(message)
                        .map_err(|e| SweepError::Store(format!("serialize record: {e}")))?;
                    writeln!(file, "{line}").map_err(|e| SweepError::io(&tmp, e))?;
                }
            }
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| SweepError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl MessageLog for FileLog {
    async fn conversation_ids(&self) -> Result<Vec<String>> {
        Ok(self.conversations.read().await.keys().cloned().collect())
    }

    async fn get_message(
        &self,
        conversation_id: &str,
        client_message_id: i64,
    ) -> Result<Option<RawMessage>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).and_then(|records| {
            records
                .iter()
                .find(|m| m.client_message_id == client_message_id)
                .cloned()
        }))
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        cursor: Cursor,
        page_size: usize,
        newest_first: bool,
        predicate: Option<&MessagePredicate>,
    ) -> Result<Vec<RawMessage>> {
        let conversations = self.conversations.read().await;
        let records = conversations
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(page_over(records, cursor, page_size, newest_first, predicate))
    }

    async fn update_content_type(
        &self,
        conversation_id: &str,
        client_message_id: i64,
        tag: ContentType,
    ) -> Result<()> {
        {
            let mut conversations = self.conversations.write().await;
            let records = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| SweepError::InvalidConversation(conversation_id.to_string()))?;
            let record = records
                .iter_mut()
                .find(|m| m.client_message_id == client_message_id)
                .ok_or_else(|| {
                    SweepError::Store(format!(
                        "no record {client_message_id} in conversation {conversation_id}"
                    ))
                })?;
            record.content_type = tag;
        }
        self.persist().await
    }
}
