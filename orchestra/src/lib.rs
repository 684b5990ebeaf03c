/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Orchestra – autonomous TSCH scheduling
//!
//! Every node derives its link schedule from its own address, its parent and
//! its children.  No schedule is ever negotiated over the air.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── linkaddr     – 8-byte link-layer addresses
//! ├── hash         – address → timeslot mapping
//! ├── schedule/    – TSCH link-table seam + in-memory table
//! ├── packet       – outgoing frame metadata
//! ├── event        – topology notifications
//! ├── routing      – storing-mode child lookup seam
//! ├── rule/        – scheduling rules, one slotframe each
//! ├── dispatcher/  – rule list, priority selection, event fan-out
//! ├── driver       – tokio event loop around the dispatcher
//! └── config       – YAML node configuration
//! ```

pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod event;
pub mod hash;
pub mod linkaddr;
pub mod packet;
pub mod routing;
pub mod rule;
pub mod schedule;

pub use dispatcher::{Orchestra, OrchestraError, PacketSelection};
