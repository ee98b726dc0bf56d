//! Scripted in-process transport for tests.

use super::{OpenedSession, Transport, TransportError, TransportResult};
use crate::session::challenge::Challenge;
use crate::sync::models::{EntityType, SyncRecord};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Replays queued responses; falls back to a successful default when a
/// queue runs dry.
#[derive(Default)]
pub struct ScriptedTransport {
    challenges: Mutex<VecDeque<TransportResult<Challenge>>>,
    opens: Mutex<VecDeque<TransportResult<OpenedSession>>>,
    keep_alives: Mutex<VecDeque<TransportResult<()>>>,
    lists: Mutex<HashMap<EntityType, VecDeque<TransportResult<Vec<SyncRecord>>>>>,
    secrets: Mutex<Vec<String>>,
    open_delay: Option<Duration>,
    pub challenge_calls: AtomicUsize,
    pub open_calls: AtomicUsize,
    pub keep_alive_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every open call, to widen the window for concurrent callers.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn push_challenge(&self, result: TransportResult<Challenge>) {
        self.challenges.lock().unwrap().push_back(result);
    }

    pub fn push_open(&self, result: TransportResult<OpenedSession>) {
        self.opens.lock().unwrap().push_back(result);
    }

    pub fn push_keep_alive(&self, result: TransportResult<()>) {
        self.keep_alives.lock().unwrap().push_back(result);
    }

    pub fn push_list(&self, entity_type: EntityType, result: TransportResult<Vec<SyncRecord>>) {
        self.lists
            .lock()
            .unwrap()
            .entry(entity_type)
            .or_default()
            .push_back(result);
    }

    /// Secrets posted to the open endpoint, in order.
    pub fn secrets(&self) -> Vec<String> {
        self.secrets.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// An open response carrying `code` and nothing else.
pub fn opened(code: &str) -> OpenedSession {
    OpenedSession {
        session_code: Some(code.to_string()),
        keychain: None,
        lifetime: None,
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request_challenge(&self) -> TransportResult<Challenge> {
        self.challenge_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.challenges.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Challenge::none()))
    }

    async fn open_session(&self, secret: &str) -> TransportResult<OpenedSession> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.secrets.lock().unwrap().push(secret.to_string());
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.opens.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(opened("session-code")))
    }

    async fn keep_alive(&self, _session_code: &str) -> TransportResult<()> {
        self.keep_alive_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.keep_alives.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn close_session(&self, _session_code: &str) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_entities(
        &self,
        entity_type: EntityType,
        _session_code: Option<&str>,
    ) -> TransportResult<Vec<SyncRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .lists
            .lock()
            .unwrap()
            .get_mut(&entity_type)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Shorthand for a failed status response.
pub fn status(code: u16) -> TransportError {
    TransportError::Status(code)
}
