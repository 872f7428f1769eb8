// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deterministic in-memory bridges for tests and desktop/CI builds where the
// native layer is absent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use vigil_core::error::{Result, VigilError};
use vigil_core::types::{ProbeKind, SignalSource};

use crate::traits::*;

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Fail,
}

/// Probe with fixed answers per kind. Counts every query.
pub struct StaticProbe {
    answers: [Answer; 4],
    source: SignalSource,
    calls: AtomicUsize,
}

impl StaticProbe {
    /// All four checks answer `false`.
    pub fn clean(source: SignalSource) -> Self {
        Self {
            answers: [Answer::No; 4],
            source,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer `value` for `kind`.
    pub fn with(mut self, kind: ProbeKind, value: bool) -> Self {
        self.answers[Self::slot(kind)] = if value { Answer::Yes } else { Answer::No };
        self
    }

    /// Fail every query for `kind`.
    pub fn failing(mut self, kind: ProbeKind) -> Self {
        self.answers[Self::slot(kind)] = Answer::Fail;
        self
    }

    /// Total number of queries answered or failed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn slot(kind: ProbeKind) -> usize {
        match kind {
            ProbeKind::Root => 0,
            ProbeKind::Emulator => 1,
            ProbeKind::DeveloperMode => 2,
            ProbeKind::InstrumentationTool => 3,
        }
    }

    fn answer(&self, kind: ProbeKind) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers[Self::slot(kind)] {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            Answer::Fail => Err(VigilError::Probe(format!("{kind} probe unavailable"))),
        }
    }
}

#[async_trait]
impl PlatformProbe for StaticProbe {
    fn source(&self) -> SignalSource {
        self.source
    }

    fn name(&self) -> &str {
        "static"
    }

    async fn is_root_or_jailbroken(&self) -> Result<bool> {
        self.answer(ProbeKind::Root)
    }

    async fn is_emulator_or_simulator(&self) -> Result<bool> {
        self.answer(ProbeKind::Emulator)
    }

    async fn is_developer_mode_enabled(&self) -> Result<bool> {
        self.answer(ProbeKind::DeveloperMode)
    }

    async fn has_instrumentation_artifacts(&self) -> Result<bool> {
        self.answer(ProbeKind::InstrumentationTool)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Bool(bool),
    Text(String),
}

/// [`NativeChannel`] answering from a fixed method table.
///
/// Unknown methods fail the way an unimplemented platform handler would.
#[derive(Default)]
pub struct ScriptedChannel {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, method: &str, value: bool) -> Self {
        self.replies.insert(method.to_owned(), Reply::Bool(value));
        self
    }

    pub fn with_string(mut self, method: &str, value: &str) -> Self {
        self.replies
            .insert(method.to_owned(), Reply::Text(value.to_owned()));
        self
    }

    /// How many times `method` was invoked.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(method).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn reply(&self, method: &str) -> Result<Reply> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(method.to_owned()).or_default() += 1;
        }
        self.replies
            .get(method)
            .cloned()
            .ok_or_else(|| VigilError::Bridge(format!("method {method} not implemented")))
    }
}

#[async_trait]
impl NativeChannel for ScriptedChannel {
    async fn invoke_bool(&self, method: &str) -> Result<bool> {
        match self.reply(method)? {
            Reply::Bool(value) => Ok(value),
            Reply::Text(_) => Err(VigilError::Bridge(format!("{method} returned a string"))),
        }
    }

    async fn invoke_string(&self, method: &str) -> Result<String> {
        match self.reply(method)? {
            Reply::Text(value) => Ok(value),
            Reply::Bool(_) => Err(VigilError::Bridge(format!("{method} returned a boolean"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets and protected storage
// ---------------------------------------------------------------------------

/// Native secret with a fixed value, or one that is never available.
pub struct StaticSecret(Option<String>);

impl StaticSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Some(secret.into()))
    }

    pub fn unavailable() -> Self {
        Self(None)
    }
}

#[async_trait]
impl NativeSecretSource for StaticSecret {
    async fn native_secret(&self) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| VigilError::NativeSecret("native key provider not registered".into()))
    }
}

/// In-memory [`SecureStorage`] with switchable failures.
#[derive(Default)]
pub struct MemorySecureStorage {
    entries: Mutex<HashMap<String, String>>,
    broken: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose every operation fails, as with a corrupted keystore.
    pub fn broken() -> Self {
        let storage = Self::default();
        storage.set_broken(true);
        storage
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(VigilError::SecureStorage("keystore unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn poisoned() -> VigilError {
        VigilError::SecureStorage("storage lock poisoned".into())
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_owned(), value.to_owned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_probe_answers_and_counts() {
        let probe = StaticProbe::clean(SignalSource::Primary)
            .with(ProbeKind::Root, true)
            .failing(ProbeKind::Emulator);

        assert!(probe.is_root_or_jailbroken().await.unwrap());
        assert!(probe.is_emulator_or_simulator().await.is_err());
        assert!(!probe.is_developer_mode_enabled().await.unwrap());
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn memory_storage_round_trip() {
        let storage = MemorySecureStorage::new();
        assert_eq!(storage.read("k").await.unwrap(), None);

        storage.write("k", "v").await.unwrap();
        assert_eq!(storage.read("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(storage.writes(), 1);

        storage.delete("k").await.unwrap();
        assert_eq!(storage.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn broken_storage_fails_everything() {
        let storage = MemorySecureStorage::broken();
        assert!(storage.read("k").await.is_err());
        assert!(storage.write("k", "v").await.is_err());
    }

    #[tokio::test]
    async fn unavailable_secret() {
        assert!(StaticSecret::unavailable().native_secret().await.is_err());
        assert_eq!(StaticSecret::new("s").native_secret().await.unwrap(), "s");
    }
}
