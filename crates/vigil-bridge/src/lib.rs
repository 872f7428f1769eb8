// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vigil: Native platform bridge abstractions.
//
// Defines the capability surface the security core consumes from the host:
// integrity probes, the attested native secret, and protected storage. Hosts
// that expose a method channel plug in through `ChannelProbe`; hosts whose
// filesystem Rust can read directly use the `HeuristicProbe` battery.

use std::sync::Arc;

pub mod channel;
pub mod heuristics;
pub mod stub;
pub mod traits;

pub use channel::{ChannelNames, ChannelProbe};
pub use heuristics::{Confidence, Heuristic, HeuristicProbe};
pub use traits::{NativeChannel, NativeSecretSource, PlatformProbe, SecureStorage};

/// Default probe for the running host.
///
/// Runs the heuristic battery against the real filesystem root. Mobile hosts
/// that ship native probes should build a `ChannelProbe` instead.
pub fn platform_probe() -> Arc<dyn PlatformProbe> {
    Arc::new(HeuristicProbe::host())
}
