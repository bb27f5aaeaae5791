// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use dw_importer::{
    config::{
        ImporterConfig, MalformedRecordPolicy, TimestampPolicy, DEFAULT_DUMPFILE,
        DEFAULT_QUEUE_DEPTH_PER_WORKER, DEFAULT_RESOURCE, DEFAULT_ROUTER, DEFAULT_WORKERS,
    },
    logger::Formatter,
    pipeline::Pipeline,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Imports a location-log JSON dump into the router's bulk save API.
#[derive(Parser, Debug)]
#[command(name = "dw-importer", version, about, long_about = None)]
struct Args {
    /// Router host.
    #[arg(long, default_value = DEFAULT_ROUTER)]
    router: String,

    /// Location-log JSON dump, one record per line.
    #[arg(long, default_value = DEFAULT_DUMPFILE)]
    dumpfile: PathBuf,

    /// Number of workers sending data.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    threads: usize,

    /// API resource the records are saved under.
    #[arg(long, default_value = DEFAULT_RESOURCE)]
    resource: String,

    /// Records queued per worker before reading pauses.
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH_PER_WORKER)]
    queue_depth: usize,

    /// Deadline for each delivery, in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// HTTPS proxy URL.
    #[arg(long)]
    https_proxy: Option<String>,

    /// Log and skip malformed lines instead of stopping the import.
    #[arg(long)]
    skip_malformed: bool,

    /// Send records with unparseable timestamps as 0 instead of stopping.
    #[arg(long)]
    lenient_timestamps: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ImporterConfig {
        ImporterConfig {
            router: self.router,
            resource: self.resource,
            dumpfile: self.dumpfile,
            workers: self.threads,
            queue_depth_per_worker: self.queue_depth,
            delivery_timeout: Duration::from_secs(self.timeout_secs),
            https_proxy: self.https_proxy,
            malformed_records: if self.skip_malformed {
                MalformedRecordPolicy::Skip
            } else {
                MalformedRecordPolicy::Abort
            },
            timestamps: if self.lenient_timestamps {
                TimestampPolicy::Lenient
            } else {
                TimestampPolicy::Strict
            },
            log_level: self.log_level.to_lowercase(),
        }
    }
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = Args::parse().into_config();

    if let Err(e) = config.validate() {
        eprintln!("dw-importer: {e}");
        return ExitCode::FAILURE;
    }

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,reqwest=off,{}",
        config.log_level
    );
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("dw-importer: could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("dw-importer: setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Error creating importer: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(cancel_on_interrupt(pipeline.cancel_token()));

    match pipeline.run().await {
        Ok(summary) => {
            info!(
                read = summary.read,
                delivered = summary.delivered,
                failed = summary.failed,
                skipped = summary.skipped,
                "Import finished"
            );
            if summary.failed > 0 {
                warn!(
                    "{} records were not delivered, see the log above to replay them",
                    summary.failed
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Import failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_interrupt(cancel_token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted, stopping import");
            cancel_token.cancel();
        }
        Err(e) => debug!("Unable to listen for interrupts: {e}"),
    }
}
