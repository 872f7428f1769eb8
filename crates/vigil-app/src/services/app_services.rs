// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: loads the config, opens the preference database
// and runs trust checks for the doctor.
//
// The doctor has no native secret source, so its preference store never gets
// a cipher. It only records non-sensitive run bookkeeping.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use vigil_bridge::PlatformProbe;
use vigil_core::SecurityConfig;
use vigil_core::error::Result;
use vigil_core::types::TrustVerdict;
use vigil_security::{EncryptedPreferenceStore, SqliteKeyValueStore, TrustEvaluator};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";
const PREFERENCES_DB: &str = "preferences.db";

const RUNS_KEY: &str = "doctor.runs";
const LAST_TRUSTED_KEY: &str = "doctor.last_trusted";

/// Everything the doctor needs for one run.
pub struct AppServices {
    data_dir: PathBuf,
    config: SecurityConfig,
    preferences: EncryptedPreferenceStore,
    probe: Arc<dyn PlatformProbe>,
}

impl AppServices {
    /// Initialise against the user's data directory and the host filesystem.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        Self::open(&dir, vigil_bridge::platform_probe())
    }

    /// Initialise against `dir` with the given probe.
    pub fn open(dir: &Path, probe: Arc<dyn PlatformProbe>) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");

        let config = load_config(dir);
        let store = SqliteKeyValueStore::open(dir.join(PREFERENCES_DB))?;

        let preferences = EncryptedPreferenceStore::from_config(Arc::new(store), None, &config);

        Ok(Self {
            data_dir: dir.to_path_buf(),
            config,
            preferences,
            probe,
        })
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Run one evaluation and record the outcome.
    pub async fn check_device(&self) -> TrustVerdict {
        let evaluator = TrustEvaluator::from_config(Arc::clone(&self.probe), None, &self.config);
        let verdict = evaluator.evaluate().await;

        for signal in verdict.signals.iter().filter(|s| s.value) {
            debug!(kind = %signal.kind, failed = signal.failed, "signal raised");
        }

        let runs = self.preferences.get_int(RUNS_KEY).await.unwrap_or(0);
        let recorded = self.preferences.set_int(RUNS_KEY, runs + 1).await
            && self
                .preferences
                .set_bool(LAST_TRUSTED_KEY, !verdict.compromised)
                .await;
        if !recorded {
            warn!("could not record doctor run");
        }
        verdict
    }

    /// Number of completed runs, including this one.
    pub async fn runs(&self) -> i64 {
        self.preferences.get_int(RUNS_KEY).await.unwrap_or(0)
    }

    pub async fn last_trusted(&self) -> Option<bool> {
        self.preferences.get_bool(LAST_TRUSTED_KEY).await
    }
}

/// Load the persisted config, or defaults when missing or unreadable.
fn load_config(dir: &Path) -> SecurityConfig {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return SecurityConfig::default();
    }
    SecurityConfig::load(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), "ignoring unreadable config: {e}");
        SecurityConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use vigil_bridge::stub::StaticProbe;
    use vigil_core::types::{ProbeKind, SignalSource};

    use super::*;

    #[tokio::test]
    async fn clean_device_run_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let services =
            AppServices::open(dir.path(), Arc::new(StaticProbe::clean(SignalSource::Primary))).unwrap();

        let verdict = services.check_device().await;
        assert!(!verdict.compromised);
        assert_eq!(services.runs().await, 1);
        assert_eq!(services.last_trusted().await, Some(true));
    }

    #[tokio::test]
    async fn runs_accumulate_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let probe = StaticProbe::clean(SignalSource::Primary).with(ProbeKind::Root, true);
            let services = AppServices::open(dir.path(), Arc::new(probe)).unwrap();
            assert!(services.check_device().await.compromised);
        }
        let services =
            AppServices::open(dir.path(), Arc::new(StaticProbe::clean(SignalSource::Primary))).unwrap();
        assert_eq!(services.runs().await, 2);
        assert_eq!(services.last_trusted().await, Some(false));
    }

    #[tokio::test]
    async fn development_config_tolerates_developer_mode() {
        let dir = tempfile::tempdir().unwrap();
        SecurityConfig::development()
            .persist(dir.path().join(CONFIG_FILE))
            .unwrap();

        let probe = StaticProbe::clean(SignalSource::Primary).with(ProbeKind::DeveloperMode, true);
        let services = AppServices::open(dir.path(), Arc::new(probe)).unwrap();
        assert!(!services.config().hardened);
        assert!(!services.check_device().await.compromised);
    }

    #[test]
    fn broken_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert_eq!(load_config(dir.path()), SecurityConfig::default());
    }
}
