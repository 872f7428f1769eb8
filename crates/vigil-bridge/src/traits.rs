// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for native capabilities.
//
// The native layer answers integrity questions, hands out the attested
// secret, and persists one value in protected storage. Everything here is
// async because each call crosses into the host runtime and may suspend
// for an unbounded time; callers apply their own timeouts.

use std::sync::Arc;

use async_trait::async_trait;
use vigil_core::error::Result;
use vigil_core::types::{ProbeKind, SignalSource};

/// Yes/no device-integrity questions answered by the platform layer.
///
/// Queries are idempotent and side-effect free. An `Err` means the probe
/// could not answer (method missing, platform exception); callers decide
/// what that means, the trust evaluator treats it as a positive signal.
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    /// Which channel this probe reports through.
    fn source(&self) -> SignalSource;

    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Root (Android) or jailbreak (iOS) present.
    async fn is_root_or_jailbroken(&self) -> Result<bool>;

    /// Running in an emulator or simulator.
    async fn is_emulator_or_simulator(&self) -> Result<bool>;

    /// Developer options or USB debugging enabled.
    async fn is_developer_mode_enabled(&self) -> Result<bool>;

    /// Frida, Xposed or similar instrumentation artifacts present.
    async fn has_instrumentation_artifacts(&self) -> Result<bool>;

    /// Dispatch on [`ProbeKind`].
    async fn query(&self, kind: ProbeKind) -> Result<bool> {
        match kind {
            ProbeKind::Root => self.is_root_or_jailbroken().await,
            ProbeKind::Emulator => self.is_emulator_or_simulator().await,
            ProbeKind::DeveloperMode => self.is_developer_mode_enabled().await,
            ProbeKind::InstrumentationTool => self.has_instrumentation_artifacts().await,
        }
    }

    /// Answer several kinds in one pass, in the order given.
    ///
    /// The default asks [`query`](Self::query) once per kind. Probes that
    /// share expensive setup across kinds override this.
    async fn query_all(&self, kinds: &[ProbeKind]) -> Vec<Result<bool>> {
        let mut answers = Vec::with_capacity(kinds.len());
        for kind in kinds {
            answers.push(self.query(*kind).await);
        }
        answers
    }
}

/// Transport into the host runtime (method channel, JNI, FFI callback).
///
/// Methods are addressed by short string names and take no arguments.
#[async_trait]
pub trait NativeChannel: Send + Sync {
    /// Invoke a method that returns a boolean.
    async fn invoke_bool(&self, method: &str) -> Result<bool>;

    /// Invoke a method that returns a UTF-8 string.
    async fn invoke_string(&self, method: &str) -> Result<String>;
}

#[async_trait]
impl<T: NativeChannel + ?Sized> NativeChannel for Arc<T> {
    async fn invoke_bool(&self, method: &str) -> Result<bool> {
        (**self).invoke_bool(method).await
    }

    async fn invoke_string(&self, method: &str) -> Result<String> {
        (**self).invoke_string(method).await
    }
}

/// Source of the platform-attested secret compiled into the native binary.
///
/// The secret raises the bar but is extractable; it is never used alone.
#[async_trait]
pub trait NativeSecretSource: Send + Sync {
    async fn native_secret(&self) -> Result<String>;
}

/// OS-protected storage (Keychain / Keystore-backed preferences).
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read a value. Returns `None` if the key was never written.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store a value under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
