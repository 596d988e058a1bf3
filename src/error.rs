// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Typed errors for operations the operator can get rejected

use thiserror::Error;

/// Rejection reasons surfaced to the presentation layer.
///
/// State is never modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("sensor name '{0}' already exists")]
    AlreadyExists(String),

    #[error("no free sensor name left for prefix '{0}'")]
    ResourceExhausted(String),

    #[error("invalid time format '{0}', expected HH:MM (e.g. 22:00)")]
    InvalidFormat(String),

    #[error("unknown sensor '{0}'")]
    NotFound(String),

    #[error("sensor name must not be empty")]
    InvalidName,

    #[error("alarm engine is not running")]
    EngineStopped,
}

pub type ControlResult<T> = std::result::Result<T, ControlError>;
