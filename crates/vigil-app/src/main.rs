// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vigil: device-trust doctor
//
// Entry point. Initialises logging and services, evaluates the host, and
// prints the verdict. Exit status: 0 trusted, 2 compromised, 1 on setup
// failure.

mod services;

use std::process::ExitCode;

use vigil_core::human_errors::{blocked_device_notice, humanize_error};

use services::app_services::AppServices;

const EXIT_COMPROMISED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Vigil starting");

    let services = match AppServices::init() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "service initialisation failed");
            let human = humanize_error(&e);
            eprintln!("{}\n{}", human.message, human.suggestion);
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(
        path = %services.data_dir().display(),
        hardened = services.config().hardened,
        "services ready"
    );

    let previous = services.last_trusted().await;
    let verdict = services.check_device().await;
    tracing::info!(runs = services.runs().await, "check recorded");
    if previous == Some(false) && !verdict.compromised {
        tracing::info!("device trusted again since the last check");
    }

    if verdict.compromised {
        let notice = blocked_device_notice();
        println!("{}\n{}", notice.message, notice.suggestion);
        ExitCode::from(EXIT_COMPROMISED)
    } else {
        println!("Device trusted.");
        ExitCode::SUCCESS
    }
}
