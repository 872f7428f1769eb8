// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Weighted heuristic battery for hosts whose filesystem we can inspect.
//
// Each heuristic is an independent predicate over a `DeviceView` (a
// filesystem root plus build/settings properties) tagged with the kind it
// indicates and a confidence. A kind is flagged once the summed weight of
// its firing heuristics reaches `DETECTION_THRESHOLD`, so a single
// low-confidence hit (a stray busybox, a hypervisor CPU flag) does not
// block a device on its own.
//
// Every scan reads the device afresh, once for all the kinds it answers,
// on the blocking thread pool. Unreadable files count as absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use vigil_core::error::{Result, VigilError};
use vigil_core::types::{ProbeKind, SignalSource};

use crate::traits::PlatformProbe;

/// Summed confidence weight at which a kind is reported.
pub const DETECTION_THRESHOLD: u32 = 3;

/// How strongly a single heuristic indicates its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn weight(self) -> u32 {
        match self {
            Confidence::Low => 1,
            Confidence::Medium => 2,
            Confidence::High => DETECTION_THRESHOLD,
        }
    }
}

/// One named predicate.
pub struct Heuristic {
    pub name: &'static str,
    pub kind: ProbeKind,
    pub confidence: Confidence,
    check: fn(&DeviceView) -> bool,
}

impl Heuristic {
    pub fn fires(&self, view: &DeviceView) -> bool {
        (self.check)(view)
    }
}

impl std::fmt::Debug for Heuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heuristic")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("confidence", &self.confidence)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Artifact tables
// ---------------------------------------------------------------------------

const SU_PATHS: &[&str] = &[
    "/system/bin/su",
    "/system/xbin/su",
    "/sbin/su",
    "/system/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/data/local/bin/su",
    "/data/local/xbin/su",
    "/su/bin/su",
];

const MAGISK_PATHS: &[&str] = &[
    "/data/adb/magisk",
    "/sbin/.magisk",
    "/cache/.disable_magisk",
    "/dev/.magisk.unblock",
    "/data/adb/modules",
];

const ROOT_APP_DIRS: &[&str] = &[
    "/data/data/com.topjohnwu.magisk",
    "/data/data/eu.chainfire.supersu",
    "/data/data/com.noshufou.android.su",
    "/data/data/com.koushikdutta.superuser",
    "/data/data/com.thirdparty.superuser",
    "/data/data/com.yellowes.su",
    "/data/data/com.kingroot.kinguser",
];

const BUSYBOX_PATHS: &[&str] = &[
    "/system/bin/busybox",
    "/system/xbin/busybox",
    "/sbin/busybox",
    "/data/local/busybox",
];

const JAILBREAK_PATHS: &[&str] = &[
    "/Applications/Cydia.app",
    "/Applications/Sileo.app",
    "/Applications/Zebra.app",
    "/var/lib/cydia",
    "/private/var/lib/cydia",
    "/private/var/stash",
    "/var/jb",
    "/usr/libexec/cydia",
    "/etc/apt/sources.list.d/cydia.list",
];

const QEMU_FILES: &[&str] = &[
    "/dev/socket/qemud",
    "/dev/qemu_pipe",
    "/dev/goldfish_pipe",
    "/system/lib/libc_malloc_debug_qemu.so",
    "/sys/qemu_trace",
    "/system/bin/qemu-props",
];

const EMULATOR_HARDWARE: &[&str] = &["goldfish", "ranchu", "vbox86"];

const FRIDA_PATHS: &[&str] = &[
    "/data/local/tmp/frida-server",
    "/data/local/tmp/re.frida.server",
    "/system/bin/frida-server",
    "/system/xbin/frida-server",
    "/usr/sbin/frida-server",
    "/usr/bin/frida-server",
];

const HOOK_FRAMEWORK_PATHS: &[&str] = &[
    "/system/framework/XposedBridge.jar",
    "/system/lib/libxposed_art.so",
    "/data/data/de.robv.android.xposed.installer",
    "/data/data/org.lsposed.manager",
    "/data/adb/lspd",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/usr/lib/libsubstrate.dylib",
    "/usr/lib/TweakInject",
];

/// Frida's default listening ports (27042, 27043) as they appear in
/// `/proc/net/tcp`.
const FRIDA_PORTS_HEX: &[&str] = &["69A2", "69A3"];

/// Property files merged into the view, later files winning.
const PROPERTY_FILES: &[&str] = &["/default.prop", "/system/build.prop", "/vendor/build.prop"];

// ---------------------------------------------------------------------------
// Heuristic table
// ---------------------------------------------------------------------------

static HEURISTICS: &[Heuristic] = &[
    // -- Root / jailbreak --
    Heuristic {
        name: "su-binary",
        kind: ProbeKind::Root,
        confidence: Confidence::High,
        check: |v| v.any_exists(SU_PATHS),
    },
    Heuristic {
        name: "magisk-artifacts",
        kind: ProbeKind::Root,
        confidence: Confidence::High,
        check: |v| v.any_exists(MAGISK_PATHS),
    },
    Heuristic {
        name: "jailbreak-artifacts",
        kind: ProbeKind::Root,
        confidence: Confidence::High,
        check: |v| v.any_exists(JAILBREAK_PATHS),
    },
    Heuristic {
        name: "root-manager-package",
        kind: ProbeKind::Root,
        confidence: Confidence::Medium,
        check: |v| v.any_exists(ROOT_APP_DIRS),
    },
    Heuristic {
        name: "test-keys-build",
        kind: ProbeKind::Root,
        confidence: Confidence::Medium,
        check: |v| v.prop_contains("ro.build.tags", "test-keys"),
    },
    Heuristic {
        name: "insecure-build",
        kind: ProbeKind::Root,
        confidence: Confidence::Medium,
        check: |v| v.prop_is("ro.secure", "0"),
    },
    Heuristic {
        name: "writable-system-partition",
        kind: ProbeKind::Root,
        confidence: Confidence::Medium,
        check: system_mounted_rw,
    },
    Heuristic {
        name: "busybox-binary",
        kind: ProbeKind::Root,
        confidence: Confidence::Low,
        check: |v| v.any_exists(BUSYBOX_PATHS),
    },
    // -- Emulator / simulator --
    Heuristic {
        name: "qemu-kernel",
        kind: ProbeKind::Emulator,
        confidence: Confidence::High,
        check: |v| v.prop_is("ro.kernel.qemu", "1") || v.prop_is("ro.boot.qemu", "1"),
    },
    Heuristic {
        name: "emulator-hardware",
        kind: ProbeKind::Emulator,
        confidence: Confidence::High,
        check: |v| {
            ["ro.hardware", "ro.boot.hardware"].iter().any(|key| {
                v.prop(key)
                    .is_some_and(|hw| EMULATOR_HARDWARE.iter().any(|m| hw.contains(m)))
            })
        },
    },
    Heuristic {
        name: "qemu-device-files",
        kind: ProbeKind::Emulator,
        confidence: Confidence::High,
        check: |v| v.any_exists(QEMU_FILES),
    },
    Heuristic {
        name: "genymotion-manufacturer",
        kind: ProbeKind::Emulator,
        confidence: Confidence::High,
        check: |v| v.prop_contains("ro.product.manufacturer", "Genymotion"),
    },
    Heuristic {
        name: "generic-product",
        kind: ProbeKind::Emulator,
        confidence: Confidence::Medium,
        check: |v| {
            v.prop_contains("ro.product.model", "Android SDK built for")
                || v.prop_contains("ro.product.model", "Emulator")
                || v.prop_is("ro.product.model", "sdk")
                || v.prop("ro.build.fingerprint")
                    .is_some_and(|f| f.starts_with("generic"))
        },
    },
    Heuristic {
        name: "emulator-cpuinfo",
        kind: ProbeKind::Emulator,
        confidence: Confidence::Medium,
        check: |v| {
            v.read("/proc/cpuinfo")
                .is_some_and(|c| c.contains("goldfish") || c.contains("Android Virtual"))
        },
    },
    Heuristic {
        name: "emulator-network",
        kind: ProbeKind::Emulator,
        confidence: Confidence::Medium,
        check: |v| v.prop_is("net.eth0.gw", "10.0.2.2") || v.prop_is("net.dns1", "10.0.2.3"),
    },
    Heuristic {
        name: "hypervisor-cpu-flag",
        kind: ProbeKind::Emulator,
        confidence: Confidence::Low,
        check: |v| {
            v.read("/proc/cpuinfo").is_some_and(|c| {
                c.lines()
                    .filter(|l| l.starts_with("flags"))
                    .any(|l| l.split_whitespace().any(|f| f == "hypervisor"))
            })
        },
    },
    // -- Developer mode --
    Heuristic {
        name: "developer-options",
        kind: ProbeKind::DeveloperMode,
        confidence: Confidence::High,
        check: |v| v.prop_is("settings.global.development_settings_enabled", "1"),
    },
    Heuristic {
        name: "adb-enabled",
        kind: ProbeKind::DeveloperMode,
        confidence: Confidence::High,
        check: |v| v.prop_is("settings.global.adb_enabled", "1"),
    },
    Heuristic {
        name: "debuggable-build",
        kind: ProbeKind::DeveloperMode,
        confidence: Confidence::Medium,
        check: |v| v.prop_is("ro.debuggable", "1"),
    },
    Heuristic {
        name: "usb-config-adb",
        kind: ProbeKind::DeveloperMode,
        confidence: Confidence::Medium,
        check: |v| v.prop_contains("persist.sys.usb.config", "adb"),
    },
    // -- Instrumentation --
    Heuristic {
        name: "frida-server-binary",
        kind: ProbeKind::InstrumentationTool,
        confidence: Confidence::High,
        check: |v| v.any_exists(FRIDA_PATHS),
    },
    Heuristic {
        name: "frida-default-port",
        kind: ProbeKind::InstrumentationTool,
        confidence: Confidence::High,
        check: frida_port_listening,
    },
    Heuristic {
        name: "frida-mapped-library",
        kind: ProbeKind::InstrumentationTool,
        confidence: Confidence::High,
        check: |v| {
            v.read("/proc/self/maps").is_some_and(|maps| {
                maps.contains("frida-agent") || maps.contains("frida-gadget")
            })
        },
    },
    Heuristic {
        name: "hook-framework",
        kind: ProbeKind::InstrumentationTool,
        confidence: Confidence::High,
        check: |v| v.any_exists(HOOK_FRAMEWORK_PATHS),
    },
];

fn system_mounted_rw(view: &DeviceView) -> bool {
    let Some(mounts) = view.read("/proc/mounts") else {
        return false;
    };
    mounts.lines().any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields.len() >= 4
            && fields[1] == "/system"
            && fields[3].split(',').any(|opt| opt == "rw")
    })
}

fn frida_port_listening(view: &DeviceView) -> bool {
    const TCP_LISTEN: &str = "0A";
    let Some(table) = view.read("/proc/net/tcp") else {
        return false;
    };
    table.lines().skip(1).any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[3] != TCP_LISTEN {
            return false;
        }
        fields[1]
            .rsplit(':')
            .next()
            .is_some_and(|port| FRIDA_PORTS_HEX.iter().any(|p| port.eq_ignore_ascii_case(p)))
    })
}

// ---------------------------------------------------------------------------
// Device view
// ---------------------------------------------------------------------------

/// Snapshot of the filesystem root and properties used by one query.
pub struct DeviceView {
    root: PathBuf,
    props: HashMap<String, String>,
}

impl DeviceView {
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    pub fn exists(&self, path: &str) -> bool {
        std::fs::symlink_metadata(self.resolve(path)).is_ok()
    }

    pub fn any_exists(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.exists(p))
    }

    pub fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.resolve(path)).ok()
    }

    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    fn prop_is(&self, key: &str, expected: &str) -> bool {
        self.prop(key) == Some(expected)
    }

    fn prop_contains(&self, key: &str, needle: &str) -> bool {
        self.prop(key).is_some_and(|v| v.contains(needle))
    }
}

/// Parse `key=value` property lines, skipping blanks and `#` comments.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// [`PlatformProbe`] that runs the heuristic battery against a filesystem.
#[derive(Debug, Clone)]
pub struct HeuristicProbe {
    root: PathBuf,
    host_props: HashMap<String, String>,
    source: SignalSource,
}

impl HeuristicProbe {
    /// Probe the running host.
    pub fn host() -> Self {
        Self::with_root("/")
    }

    /// Probe a filesystem mounted at `root` (fixtures, device images).
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            host_props: HashMap::new(),
            source: SignalSource::Primary,
        }
    }

    /// Report through a different channel.
    pub fn reporting_as(mut self, source: SignalSource) -> Self {
        self.source = source;
        self
    }

    /// Add a property the host read for us (e.g. a
    /// `settings.global.adb_enabled` value from the platform settings
    /// provider). Overrides values from property files.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.host_props.insert(key.into(), value.into());
        self
    }

    fn view(&self) -> DeviceView {
        let mut view = DeviceView {
            root: self.root.clone(),
            props: HashMap::new(),
        };
        for file in PROPERTY_FILES {
            if let Some(text) = view.read(file) {
                view.props.extend(parse_properties(&text));
            }
        }
        view.props
            .extend(self.host_props.iter().map(|(k, v)| (k.clone(), v.clone())));
        view
    }

    /// Heuristics that currently fire, in table order.
    pub fn report(&self) -> Vec<&'static Heuristic> {
        let view = self.view();
        HEURISTICS.iter().filter(|h| h.fires(&view)).collect()
    }

    /// Whether `kind` reaches the detection threshold right now.
    pub fn detect(&self, kind: ProbeKind) -> bool {
        Self::score(&self.view(), kind)
    }

    /// Read the device once and answer every kind in `kinds`.
    pub fn detect_all(&self, kinds: &[ProbeKind]) -> Vec<bool> {
        let view = self.view();
        kinds.iter().map(|kind| Self::score(&view, *kind)).collect()
    }

    /// Run `detect_all` off the async executor.
    async fn scan(&self, kinds: &[ProbeKind]) -> Result<Vec<bool>> {
        let probe = self.clone();
        let kinds = kinds.to_vec();
        tokio::task::spawn_blocking(move || probe.detect_all(&kinds))
            .await
            .map_err(|e| VigilError::Probe(format!("heuristic scan aborted: {e}")))
    }

    async fn scan_one(&self, kind: ProbeKind) -> Result<bool> {
        let found = self.scan(&[kind]).await?;
        Ok(found.first().copied().unwrap_or(false))
    }

    fn score(view: &DeviceView, kind: ProbeKind) -> bool {
        let mut score = 0;
        for heuristic in HEURISTICS.iter().filter(|h| h.kind == kind) {
            if heuristic.fires(view) {
                debug!(%kind, heuristic = heuristic.name, "heuristic fired");
                score += heuristic.confidence.weight();
            }
        }
        score >= DETECTION_THRESHOLD
    }
}

#[async_trait]
impl PlatformProbe for HeuristicProbe {
    fn source(&self) -> SignalSource {
        self.source
    }

    fn name(&self) -> &str {
        "heuristics"
    }

    async fn is_root_or_jailbroken(&self) -> Result<bool> {
        self.scan_one(ProbeKind::Root).await
    }

    async fn is_emulator_or_simulator(&self) -> Result<bool> {
        self.scan_one(ProbeKind::Emulator).await
    }

    async fn is_developer_mode_enabled(&self) -> Result<bool> {
        self.scan_one(ProbeKind::DeveloperMode).await
    }

    async fn has_instrumentation_artifacts(&self) -> Result<bool> {
        self.scan_one(ProbeKind::InstrumentationTool).await
    }

    async fn query_all(&self, kinds: &[ProbeKind]) -> Vec<Result<bool>> {
        match self.scan(kinds).await {
            Ok(found) => found.into_iter().map(Ok).collect(),
            Err(e) => kinds
                .iter()
                .map(|_| Err(VigilError::Probe(e.to_string())))
                .collect(),
        }
    }
}
