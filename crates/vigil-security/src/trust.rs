// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trust evaluator: folds probe answers from every channel into a single
// verdict.
//
// Policy:
//   * compromised = OR of every signal on every channel
//   * a probe that errors counts as a positive signal
//   * developer mode is only asked about under a hardened policy
//
// Nothing is cached. Each `evaluate` asks every probe exactly once, so a
// Retry action in the host sees current device state.

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use vigil_bridge::{ChannelProbe, NativeChannel, PlatformProbe};
use vigil_core::SecurityConfig;
use vigil_core::types::{ProbeKind, TrustSignal, TrustVerdict};

/// Which checks participate in the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Treat developer options / USB debugging as a compromise.
    pub check_developer_mode: bool,
}

impl TrustPolicy {
    /// Production policy.
    pub fn hardened() -> Self {
        Self {
            check_developer_mode: true,
        }
    }

    /// Policy for builds that developers run from their own workstations.
    pub fn development() -> Self {
        Self {
            check_developer_mode: false,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            check_developer_mode: config.hardened,
        }
    }

    fn asks(&self, kind: ProbeKind) -> bool {
        kind != ProbeKind::DeveloperMode || self.check_developer_mode
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::hardened()
    }
}

/// Aggregates one or more [`PlatformProbe`] channels into a [`TrustVerdict`].
pub struct TrustEvaluator {
    probes: Vec<Arc<dyn PlatformProbe>>,
    policy: TrustPolicy,
}

impl TrustEvaluator {
    pub fn new(primary: Arc<dyn PlatformProbe>, policy: TrustPolicy) -> Self {
        Self {
            probes: vec![primary],
            policy,
        }
    }

    /// Also query an independently implemented channel.
    pub fn with_secondary(mut self, probe: Arc<dyn PlatformProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Evaluator over both named channels of one native transport.
    pub fn from_channel<C>(channel: Arc<C>, policy: TrustPolicy) -> Self
    where
        C: NativeChannel + ?Sized + 'static,
    {
        Self::new(Arc::new(ChannelProbe::primary(Arc::clone(&channel))), policy)
            .with_secondary(Arc::new(ChannelProbe::secondary(channel)))
    }

    /// Evaluator configured from settings. The secondary probe is dropped
    /// when the config disables it.
    pub fn from_config(
        primary: Arc<dyn PlatformProbe>,
        secondary: Option<Arc<dyn PlatformProbe>>,
        config: &SecurityConfig,
    ) -> Self {
        let evaluator = Self::new(primary, TrustPolicy::from_config(config));
        match secondary {
            Some(probe) if config.query_secondary_channel => evaluator.with_secondary(probe),
            _ => evaluator,
        }
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    /// Ask every probe and derive the verdict.
    ///
    /// Never fails: a probe error becomes a positive signal.
    #[instrument(skip_all, fields(channels = self.probes.len()))]
    pub async fn evaluate(&self) -> TrustVerdict {
        let kinds: Vec<ProbeKind> = ProbeKind::ALL
            .into_iter()
            .filter(|kind| self.policy.asks(*kind))
            .collect();
        let mut signals = Vec::with_capacity(self.probes.len() * kinds.len());

        for probe in &self.probes {
            let mut answers = probe.query_all(&kinds).await.into_iter();
            for &kind in &kinds {
                let signal = match answers.next() {
                    Some(Ok(value)) => TrustSignal::answered(kind, probe.source(), value),
                    Some(Err(e)) => {
                        warn!(
                            probe = probe.name(),
                            %kind,
                            "probe failed, counting as compromised: {e}"
                        );
                        TrustSignal::failed(kind, probe.source())
                    }
                    None => {
                        warn!(probe = probe.name(), %kind, "probe gave no answer, counting as compromised");
                        TrustSignal::failed(kind, probe.source())
                    }
                };
                signals.push(signal);
            }
        }

        let verdict = TrustVerdict::from_signals(signals);
        if verdict.compromised {
            warn!(reason = verdict.reason.as_deref().unwrap_or_default(), "device not trusted");
        } else {
            debug!("device trusted");
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use vigil_bridge::stub::{ScriptedChannel, StaticProbe};
    use vigil_core::types::{GENERIC_FAILURE_REASON, SignalSource};

    use super::*;

    fn clean(source: SignalSource) -> StaticProbe {
        StaticProbe::clean(source)
    }

    fn evaluator(primary: StaticProbe) -> TrustEvaluator {
        TrustEvaluator::new(Arc::new(primary), TrustPolicy::hardened())
    }

    #[tokio::test]
    async fn all_clear_is_trusted() {
        let verdict = evaluator(clean(SignalSource::Primary)).evaluate().await;
        assert!(!verdict.compromised);
        assert!(verdict.reason.is_none());
        assert_eq!(verdict.signals.len(), 4);
    }

    #[tokio::test]
    async fn any_single_signal_compromises() {
        for kind in ProbeKind::ALL {
            let verdict = evaluator(clean(SignalSource::Primary).with(kind, true))
                .evaluate()
                .await;
            assert!(verdict.compromised, "{kind} alone must compromise");
            assert_eq!(verdict.reason.as_deref(), Some(kind.reason()));
        }
    }

    #[tokio::test]
    async fn rooted_device_reason() {
        let verdict = evaluator(clean(SignalSource::Primary).with(ProbeKind::Root, true))
            .evaluate()
            .await;
        assert!(verdict.compromised);
        assert!(verdict.reason.unwrap().contains("rooted"));
    }

    #[tokio::test]
    async fn root_outranks_emulator() {
        let probe = clean(SignalSource::Primary)
            .with(ProbeKind::Emulator, true)
            .with(ProbeKind::Root, true);
        let verdict = evaluator(probe).evaluate().await;
        assert_eq!(verdict.reason.as_deref(), Some(ProbeKind::Root.reason()));
    }

    #[tokio::test]
    async fn probe_error_fails_closed() {
        for kind in ProbeKind::ALL {
            let verdict = evaluator(clean(SignalSource::Primary).failing(kind))
                .evaluate()
                .await;
            assert!(verdict.compromised);
            assert_eq!(verdict.reason.as_deref(), Some(GENERIC_FAILURE_REASON));
        }
    }

    #[tokio::test]
    async fn developer_mode_ignored_in_development_policy() {
        let probe = Arc::new(clean(SignalSource::Primary).with(ProbeKind::DeveloperMode, true));
        let evaluator = TrustEvaluator::new(probe.clone(), TrustPolicy::development());

        let verdict = evaluator.evaluate().await;
        assert!(!verdict.compromised);
        assert_eq!(probe.calls(), 3);
        assert!(verdict
            .signals
            .iter()
            .all(|s| s.kind != ProbeKind::DeveloperMode));
    }

    #[tokio::test]
    async fn secondary_channel_signal_counts() {
        let evaluator = evaluator(clean(SignalSource::Primary)).with_secondary(Arc::new(
            clean(SignalSource::Secondary).with(ProbeKind::InstrumentationTool, true),
        ));
        let verdict = evaluator.evaluate().await;
        assert!(verdict.compromised);
        assert!(verdict.signals.iter().any(|s| s.source == SignalSource::Secondary
            && s.kind == ProbeKind::InstrumentationTool
            && s.value));
    }

    #[tokio::test]
    async fn every_probe_is_asked_once_per_evaluation() {
        let primary = Arc::new(clean(SignalSource::Primary));
        let secondary = Arc::new(clean(SignalSource::Secondary));
        let evaluator = TrustEvaluator::new(primary.clone(), TrustPolicy::hardened())
            .with_secondary(secondary.clone());

        evaluator.evaluate().await;
        evaluator.evaluate().await;
        assert_eq!(primary.calls(), 8);
        assert_eq!(secondary.calls(), 8);
    }

    /// Answers only the first kind it is asked about.
    struct ShortAnswers;

    #[async_trait::async_trait]
    impl PlatformProbe for ShortAnswers {
        fn source(&self) -> SignalSource {
            SignalSource::Primary
        }

        fn name(&self) -> &str {
            "short"
        }

        async fn is_root_or_jailbroken(&self) -> vigil_core::error::Result<bool> {
            Ok(false)
        }

        async fn is_emulator_or_simulator(&self) -> vigil_core::error::Result<bool> {
            Ok(false)
        }

        async fn is_developer_mode_enabled(&self) -> vigil_core::error::Result<bool> {
            Ok(false)
        }

        async fn has_instrumentation_artifacts(&self) -> vigil_core::error::Result<bool> {
            Ok(false)
        }

        async fn query_all(&self, kinds: &[ProbeKind]) -> Vec<vigil_core::error::Result<bool>> {
            kinds.iter().take(1).map(|_| Ok(false)).collect()
        }
    }

    #[tokio::test]
    async fn missing_answers_fail_closed() {
        let verdict = TrustEvaluator::new(Arc::new(ShortAnswers), TrustPolicy::hardened())
            .evaluate()
            .await;
        assert!(verdict.compromised);
        assert_eq!(verdict.signals.len(), 4);
        assert_eq!(verdict.signals.iter().filter(|s| s.failed).count(), 3);
        assert_eq!(verdict.reason.as_deref(), Some(GENERIC_FAILURE_REASON));
    }

    #[tokio::test]
    async fn config_can_drop_the_secondary_channel() {
        let secondary = Arc::new(clean(SignalSource::Secondary).with(ProbeKind::Root, true));
        let config = SecurityConfig {
            query_secondary_channel: false,
            ..SecurityConfig::default()
        };
        let evaluator = TrustEvaluator::from_config(
            Arc::new(clean(SignalSource::Primary)),
            Some(secondary.clone() as Arc<dyn PlatformProbe>),
            &config,
        );

        assert!(!evaluator.evaluate().await.compromised);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn channel_evaluator_queries_both_name_tables() {
        // Primary channel says clean; the obfuscated channel disagrees.
        let channel = Arc::new(
            ScriptedChannel::new()
                .with_bool("isRooted", false)
                .with_bool("isEmulator", false)
                .with_bool("isDeveloperModeEnabled", false)
                .with_bool("hasInstrumentationArtifacts", false)
                .with_bool("a1", true)
                .with_bool("b2", false)
                .with_bool("c3", false)
                .with_bool("d4", false),
        );
        let evaluator = TrustEvaluator::from_channel(Arc::clone(&channel), TrustPolicy::hardened());

        let verdict = evaluator.evaluate().await;
        assert!(verdict.compromised);
        assert!(verdict.reason.unwrap().contains("rooted"));
        assert_eq!(channel.calls("isRooted"), 1);
        assert_eq!(channel.calls("a1"), 1);
    }

    #[tokio::test]
    async fn missing_obfuscated_channel_fails_closed() {
        let channel = Arc::new(
            ScriptedChannel::new()
                .with_bool("isRooted", false)
                .with_bool("isEmulator", false)
                .with_bool("isDeveloperModeEnabled", false)
                .with_bool("hasInstrumentationArtifacts", false),
        );
        let verdict = TrustEvaluator::from_channel(channel, TrustPolicy::hardened())
            .evaluate()
            .await;
        assert!(verdict.compromised);
        assert_eq!(verdict.reason.as_deref(), Some(GENERIC_FAILURE_REASON));
    }
}
