// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous for human-supplied one-time codes.
//!
//! One exchange is outstanding process-wide. A login flow publishes the site
//! display name and parks until the operator submits a code; further requests
//! queue on the exchange lock in no particular order. Waits have no timeout
//! but end when the requesting agent's close token fires.

use crate::error::OtpError;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct Pending {
    display_name: String,
    reply: oneshot::Sender<String>,
}

/// Empties the slot when the waiting request ends or is dropped.
struct ClearSlot<'a>(&'a OtpRendezvous);

impl Drop for ClearSlot<'_> {
    fn drop(&mut self) {
        self.0.slot().take();
    }
}

/// Single-slot code exchange shared by every agent.
#[derive(Default)]
pub struct OtpRendezvous {
    exchange: tokio::sync::Mutex<()>,
    pending: Mutex<Option<Pending>>,
}

impl OtpRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a request for `display_name` and wait for the operator's code.
    pub async fn request(
        &self,
        display_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OtpError> {
        let _turn = tokio::select! {
            guard = self.exchange.lock() => guard,
            _ = cancel.cancelled() => return Err(OtpError::Cancelled),
        };

        let (reply, code) = oneshot::channel();
        *self.slot() = Some(Pending {
            display_name: display_name.to_string(),
            reply,
        });
        let _clear = ClearSlot(self);
        info!(site = display_name, "waiting for one-time code");

        tokio::select! {
            code = code => code.map_err(|_| OtpError::Cancelled),
            _ = cancel.cancelled() => Err(OtpError::Cancelled),
        }
    }

    /// Display name of the site waiting for a code. Does not consume the request.
    pub fn pending_request(&self) -> Option<String> {
        self.slot().as_ref().map(|p| p.display_name.clone())
    }

    /// Operator-facing prompt for the pending request.
    pub fn prompt(&self) -> Option<String> {
        self.pending_request().map(|name| {
            format!("{name} requires OTP. Please check your mailbox and input OTP here:")
        })
    }

    /// Deliver a code to the waiting login flow.
    pub fn submit(&self, code: &str) -> Result<(), OtpError> {
        let pending = self.slot().take().ok_or(OtpError::NoPendingRequest)?;
        pending
            .reply
            .send(code.trim().to_string())
            .map_err(|_| OtpError::NoPendingRequest)?;
        info!(site = %pending.display_name, "one-time code delivered");
        Ok(())
    }
}

/// What an adapter's login flow holds: the rendezvous plus its agent's close token.
#[derive(Clone)]
pub struct OtpHandle {
    rendezvous: Arc<OtpRendezvous>,
    cancel: CancellationToken,
}

impl OtpHandle {
    pub fn new(rendezvous: Arc<OtpRendezvous>, cancel: CancellationToken) -> Self {
        Self { rendezvous, cancel }
    }

    pub async fn request_code(&self, display_name: &str) -> Result<String, OtpError> {
        self.rendezvous.request(display_name, &self.cancel).await
    }
}
