/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Errors returned by the [`Orchestra`](super::Orchestra) dispatcher.
//!
//! A repeated time source is *not* an error: the dispatcher absorbs it
//! without consulting any rule.
//! The only runtime failure is a rule whose link-table write was refused,
//! which is reported to the routing/MAC layer that delivered the event.

use thiserror::Error;

use crate::schedule::ScheduleError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestraError {
    /// `init()` was called a second time.
    #[error("orchestra is already initialized")]
    AlreadyInitialized,

    /// A topology event arrived before `init()`.
    #[error("orchestra is not initialized, call init() before delivering events")]
    NotInitialized,

    /// Slotframe handles are 16-bit; this many rules cannot all get one.
    #[error("too many rules ({count}), slotframe handles are 16-bit")]
    TooManyRules { count: usize },

    /// A rule could not update its slotframe.
    #[error("rule '{rule}' failed: {source}")]
    Rule {
        rule: &'static str,
        #[source]
        source: ScheduleError,
    },
}
