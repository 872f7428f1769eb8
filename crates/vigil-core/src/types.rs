// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for device-trust evaluation and encrypted preferences.

use serde::{Deserialize, Serialize};

/// Generic reason used when a probe errored and nothing was positively detected.
pub const GENERIC_FAILURE_REASON: &str = "Security check failed";

/// The integrity question a single probe answers.
///
/// Variants are declared in reason-priority order: when several kinds fire,
/// the verdict reports the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProbeKind {
    /// Root (Android) or jailbreak (iOS) indicators.
    Root,
    /// Emulator or simulator hardware markers.
    Emulator,
    /// Developer options / USB debugging enabled.
    DeveloperMode,
    /// Frida, Xposed, Substrate and similar hooking frameworks.
    InstrumentationTool,
}

impl ProbeKind {
    /// Every kind, in reason-priority order.
    pub const ALL: [ProbeKind; 4] = [
        ProbeKind::Root,
        ProbeKind::Emulator,
        ProbeKind::DeveloperMode,
        ProbeKind::InstrumentationTool,
    ];

    /// Reason text attached to a verdict when this kind is detected.
    pub fn reason(self) -> &'static str {
        match self {
            ProbeKind::Root => "Device appears to be rooted or jailbroken",
            ProbeKind::Emulator => "Running on an emulator or simulator",
            ProbeKind::DeveloperMode => "Developer mode is enabled",
            ProbeKind::InstrumentationTool => "Instrumentation framework detected",
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProbeKind::Root => "root",
            ProbeKind::Emulator => "emulator",
            ProbeKind::DeveloperMode => "developer-mode",
            ProbeKind::InstrumentationTool => "instrumentation",
        };
        f.write_str(name)
    }
}

/// Which native channel produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalSource {
    /// Descriptively named channel.
    Primary,
    /// Independently implemented channel with obfuscated method names.
    Secondary,
}

/// One probe answer, produced fresh on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSignal {
    pub kind: ProbeKind,
    /// `true` when the probe reported the condition, or when it failed.
    pub value: bool,
    pub source: SignalSource,
    /// The probe errored; `value` was forced to `true`.
    pub failed: bool,
}

impl TrustSignal {
    /// A signal the probe actually answered.
    pub fn answered(kind: ProbeKind, source: SignalSource, value: bool) -> Self {
        Self {
            kind,
            value,
            source,
            failed: false,
        }
    }

    /// A signal whose probe errored. Counts as positive.
    pub fn failed(kind: ProbeKind, source: SignalSource) -> Self {
        Self {
            kind,
            value: true,
            source,
            failed: true,
        }
    }

    /// Positively detected (not merely failed).
    pub fn detected(&self) -> bool {
        self.value && !self.failed
    }
}

/// Aggregated trust decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustVerdict {
    pub compromised: bool,
    pub reason: Option<String>,
    /// Every signal collected during the evaluation that produced this verdict.
    pub signals: Vec<TrustSignal>,
}

impl TrustVerdict {
    /// Derive a verdict from a set of signals.
    ///
    /// Compromised is the OR of all signal values. The reason is the
    /// highest-priority detected kind, or the generic failure reason when
    /// only failed probes contributed.
    pub fn from_signals(signals: Vec<TrustSignal>) -> Self {
        let compromised = signals.iter().any(|s| s.value);

        let reason = ProbeKind::ALL
            .iter()
            .find(|kind| signals.iter().any(|s| s.kind == **kind && s.detected()))
            .map(|kind| kind.reason().to_owned())
            .or_else(|| compromised.then(|| GENERIC_FAILURE_REASON.to_owned()));

        Self {
            compromised,
            reason,
            signals,
        }
    }

    /// Message for the blocking screen. Never names the triggering check.
    pub fn user_message(&self) -> Option<&'static str> {
        self.compromised
            .then_some(crate::human_errors::BLOCKED_DEVICE_MESSAGE)
    }
}

/// How the symmetric key and IV are derived from the two secrets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDerivation {
    /// HKDF-SHA256 over both secrets.
    #[default]
    Hkdf,
    /// Base64 of the concatenated secrets, truncated or padded to length.
    /// Kept for installations whose preferences were written with it.
    Legacy,
}

/// Envelope format used by the secure cipher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherStrategy {
    /// Keyed stream with a per-message IV plus HMAC-SHA256 over the plaintext.
    #[default]
    StreamMac,
    /// AES-256-GCM with a per-message nonce.
    AeadBlock,
}

/// A raw value held by the preference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreferenceValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    StringList(Vec<String>),
}

impl PreferenceValue {
    /// Short tag used by persistence backends.
    pub fn kind(&self) -> &'static str {
        match self {
            PreferenceValue::String(_) => "string",
            PreferenceValue::Bool(_) => "bool",
            PreferenceValue::Int(_) => "int",
            PreferenceValue::Double(_) => "double",
            PreferenceValue::StringList(_) => "string_list",
        }
    }
}
