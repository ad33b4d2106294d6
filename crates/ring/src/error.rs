// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures surfaced by buffer lifecycle and handle-allocation calls.
///
/// Data-path operations (`add`, `read`, size queries) never return an error:
/// they degrade to neutral `false`/`0` values so transport fill code and
/// parsers can call them unconditionally, even against a buffer that was
/// never created or has already been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// Backing storage cannot hold any data. The minimum is 2 bytes: one
    /// usable byte plus the permanently unused slot that disambiguates
    /// "empty" from "full".
    StorageTooSmall,
    /// The buffer has not been created, or has been deleted.
    NotCreated,
    /// No free reader slot: every slot is taken, or the buffer was created
    /// without handle support.
    HandlesExhausted,
}

impl Error {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageTooSmall => "STORAGE_TOO_SMALL",
            Self::NotCreated => "NOT_CREATED",
            Self::HandlesExhausted => "HANDLES_EXHAUSTED",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
