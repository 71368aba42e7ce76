// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-level error codes sent to a connection in an `ERROR` frame, or used
/// as the HTTP status reason for `/metrics`. Matches the external error
/// taxonomy exactly, plus `INTERNAL` for the catch-all applied when a
/// handler task panics or hits an unexpected condition, and `UNAUTHORIZED`
/// for the bearer-token gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotJoined,
    IdentityMismatch,
    DuplicateUser,
    DuplicateObject,
    UnknownObject,
    RateLimited,
    Overloaded,
    GlobalSessionLimit,
    SessionFull,
    Malformed,
    Unauthorized,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotJoined => 409,
            Self::IdentityMismatch => 403,
            Self::DuplicateUser => 409,
            Self::DuplicateObject => 409,
            Self::UnknownObject => 404,
            Self::RateLimited => 429,
            Self::Overloaded => 503,
            Self::GlobalSessionLimit => 503,
            Self::SessionFull => 409,
            Self::Malformed => 400,
            Self::Unauthorized => 401,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotJoined => "NOT_JOINED",
            Self::IdentityMismatch => "IDENTITY_MISMATCH",
            Self::DuplicateUser => "DUPLICATE_USER",
            Self::DuplicateObject => "DUPLICATE_OBJECT",
            Self::UnknownObject => "UNKNOWN_OBJECT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Overloaded => "OVERLOADED",
            Self::GlobalSessionLimit => "GLOBAL_SESSION_LIMIT",
            Self::SessionFull => "SESSION_FULL",
            Self::Malformed => "MALFORMED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
