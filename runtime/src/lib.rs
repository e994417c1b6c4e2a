// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Paywire runtime library: fetches paywalled articles through logged-in
//! browser sessions and hands them to a read-later service.
//!
//! The binary is a thin wrapper over [`cli`]; everything else is exposed for
//! integration testing.

pub mod adapters;
pub mod agent;
pub mod cli;
pub mod config;
pub mod cookies;
pub mod error;
pub mod feed;
pub mod otp;
pub mod pipeline;
pub mod poller;
pub mod renderer;
pub mod rest;
pub mod retry;
pub mod router;
pub mod sender;
pub mod store;
pub mod supervisor;
