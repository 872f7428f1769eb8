// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Probe over a named native channel.
//
// The host exposes the same checks twice: once under descriptive method
// names and once under short obfuscated names backed by an independent
// native implementation. Hooking one channel does not silence the other.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use vigil_core::error::Result;
use vigil_core::types::{ProbeKind, SignalSource};

use crate::traits::{NativeChannel, NativeSecretSource, PlatformProbe};

/// Method names for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelNames {
    pub root: &'static str,
    pub emulator: &'static str,
    pub developer_mode: &'static str,
    pub instrumentation: &'static str,
    pub secret: &'static str,
}

impl ChannelNames {
    /// Descriptive names on the primary channel.
    pub const PRIMARY: ChannelNames = ChannelNames {
        root: "isRooted",
        emulator: "isEmulator",
        developer_mode: "isDeveloperModeEnabled",
        instrumentation: "hasInstrumentationArtifacts",
        secret: "getSecretKey",
    };

    /// Obfuscated names on the secondary channel.
    pub const SECONDARY: ChannelNames = ChannelNames {
        root: "a1",
        emulator: "b2",
        developer_mode: "c3",
        instrumentation: "d4",
        secret: "k0",
    };

    /// Method name answering `kind`.
    pub fn method(&self, kind: ProbeKind) -> &'static str {
        match kind {
            ProbeKind::Root => self.root,
            ProbeKind::Emulator => self.emulator,
            ProbeKind::DeveloperMode => self.developer_mode,
            ProbeKind::InstrumentationTool => self.instrumentation,
        }
    }
}

/// [`PlatformProbe`] that forwards each question to a [`NativeChannel`].
pub struct ChannelProbe<C> {
    channel: C,
    names: ChannelNames,
    source: SignalSource,
}

impl<C: NativeChannel> ChannelProbe<C> {
    pub fn new(channel: C, names: ChannelNames, source: SignalSource) -> Self {
        Self {
            channel,
            names,
            source,
        }
    }

    /// Probe on the descriptively named channel.
    pub fn primary(channel: C) -> Self {
        Self::new(channel, ChannelNames::PRIMARY, SignalSource::Primary)
    }

    /// Probe on the obfuscated channel.
    pub fn secondary(channel: C) -> Self {
        Self::new(channel, ChannelNames::SECONDARY, SignalSource::Secondary)
    }

    async fn ask(&self, kind: ProbeKind) -> Result<bool> {
        let method = self.names.method(kind);
        match self.channel.invoke_bool(method).await {
            Ok(value) => {
                debug!(%kind, source = ?self.source, value, "channel probe answered");
                Ok(value)
            }
            Err(e) => {
                warn!(%kind, source = ?self.source, "channel probe failed: {e}");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<C: NativeChannel> PlatformProbe for ChannelProbe<C> {
    fn source(&self) -> SignalSource {
        self.source
    }

    fn name(&self) -> &str {
        match self.source {
            SignalSource::Primary => "channel:primary",
            SignalSource::Secondary => "channel:secondary",
        }
    }

    async fn is_root_or_jailbroken(&self) -> Result<bool> {
        self.ask(ProbeKind::Root).await
    }

    async fn is_emulator_or_simulator(&self) -> Result<bool> {
        self.ask(ProbeKind::Emulator).await
    }

    async fn is_developer_mode_enabled(&self) -> Result<bool> {
        self.ask(ProbeKind::DeveloperMode).await
    }

    async fn has_instrumentation_artifacts(&self) -> Result<bool> {
        self.ask(ProbeKind::InstrumentationTool).await
    }
}

#[async_trait]
impl<C: NativeChannel> NativeSecretSource for ChannelProbe<C> {
    #[instrument(skip_all, fields(method = self.names.secret))]
    async fn native_secret(&self) -> Result<String> {
        let secret = self.channel.invoke_string(self.names.secret).await?;
        debug!(len = secret.len(), "native secret received");
        Ok(secret)
    }
}
