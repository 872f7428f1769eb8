// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable messages for security failures.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Messages never disclose which integrity check fired: naming the heuristic
// tells an attacker exactly what to hide.

use crate::error::VigilError;

/// Text shown on the blocking screen when the device is not trusted.
pub const BLOCKED_DEVICE_MESSAGE: &str =
    "This device doesn't meet the security requirements for this app.";

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Platform hiccup: retrying may help.
    Transient,
    /// User must do something (unlock the device, free storage).
    ActionRequired,
    /// Cannot be fixed by retrying; stored data or setup is broken.
    Permanent,
    /// Device is not trusted; the app must not continue.
    Blocked,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether offering a Retry action makes sense.
    pub retriable: bool,
    /// Severity level (drives icon/colour in UI).
    pub severity: Severity,
}

/// Notice for the blocking screen shown on a compromised verdict.
///
/// Retry is offered because some signals (developer mode, an attached
/// debugger) can be cleared by the user without reinstalling.
pub fn blocked_device_notice() -> HumanError {
    HumanError {
        message: BLOCKED_DEVICE_MESSAGE.into(),
        suggestion: "Use an unmodified device with developer options turned off, then tap Retry."
            .into(),
        retriable: true,
        severity: Severity::Blocked,
    }
}

/// Convert a `VigilError` into a `HumanError`.
pub fn humanize_error(err: &VigilError) -> HumanError {
    match err {
        // Probe failures are treated as a compromise; present the same notice.
        VigilError::Probe(_) => blocked_device_notice(),

        // -- Key derivation --
        VigilError::NativeSecret(_) | VigilError::KeyDerivation(_) => HumanError {
            message: "The app couldn't set up its secure storage.".into(),
            suggestion: "Try restarting the app. If this keeps happening, reinstall it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        VigilError::SecureStorage(_) => HumanError {
            message: "The device's secure storage isn't available.".into(),
            suggestion: "Unlock your device and make sure a screen lock is set, then try again."
                .into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        // -- Cipher --
        VigilError::Encryption(_) | VigilError::Decryption(_) => HumanError {
            message: "There was a security problem.".into(),
            suggestion: "The app's secure storage may need to be reset. Sign out and sign in again."
                .into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        VigilError::MalformedEnvelope(_) | VigilError::IntegrityMismatch => HumanError {
            message: "Some saved data has been changed or damaged.".into(),
            suggestion: "For your safety the data was not used. Sign in again to restore it."
                .into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Storage --
        VigilError::Preferences(_) | VigilError::Database(_) => HumanError {
            message: "The app's data storage had a problem.".into(),
            suggestion: "Try closing and reopening the app.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        VigilError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "The app doesn't have permission to use its storage.".into(),
                    suggestion: "Check the app's storage permissions in your device settings."
                        .into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, your device's storage may be full."
                        .into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        VigilError::Serialization(_) => HumanError {
            message: "The app had an internal data problem.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Platform --
        VigilError::Bridge(_) => HumanError {
            message: "A device-specific feature didn't work.".into(),
            suggestion: "Try restarting the app.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_error_is_a_block() {
        let human = humanize_error(&VigilError::Probe("channel missing".into()));
        assert_eq!(human.severity, Severity::Blocked);
        assert!(human.retriable);
        assert!(!human.message.contains("channel"));
    }

    #[test]
    fn tampering_is_permanent() {
        let human = humanize_error(&VigilError::IntegrityMismatch);
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }

    #[test]
    fn secure_storage_needs_user_action() {
        let human = humanize_error(&VigilError::SecureStorage("keystore locked".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn permission_denied_io() {
        let err = VigilError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }
}
