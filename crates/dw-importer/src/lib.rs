// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # dw-importer
//!
//! Migrates historical location logs from a line-oriented document-store dump
//! into the router's bulk save API.
//!
//! ## Architecture
//!
//! ```text
//!   dump file
//!       │
//!       v
//!   ┌──────────┐  (RawRecord, bounded)  ┌──────────┐
//!   │ Producer │ ─────────────────────> │ Worker×N │
//!   └──────────┘       WorkQueue        └────┬─────┘
//!                                            │ decode → transform → Envelope
//!                                            v
//!                                      ┌────────────┐
//!                                      │  Delivery  │ (HTTP POST, one attempt)
//!                                      └────────────┘
//! ```
//!
//! - [`producer`]: reads lines and tags them with a 1-based sequence number
//! - [`transform`]: pure mapping from the dump schema to the wire schema
//! - [`delivery`]: sends one envelope per call to the bulk save endpoint
//! - [`worker`]: dequeues, transforms, delivers and reports per record
//! - [`pipeline`]: owns the queue, the worker pool and the cancellation token

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod delivery;
pub mod errors;
pub mod http;
pub mod logger;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod record;
pub mod transform;
pub mod worker;
