/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Single-task event loop around an [`Orchestra`].
//!
//! Topology events and packet queries may come from several producers (the
//! routing layer, the MAC queue).  Orchestra itself is not re-entrant, so the
//! driver owns it on one tokio task and serializes everything through an mpsc
//! queue.  Each request carries a oneshot reply channel.
//!
//! ```text
//!  DriverHandle ──mpsc──▶ OrchestraDriver::run()
//!       ▲                      │ routes.observe(event)
//!       └────── oneshot ───────┘ orchestra.handle_event(event, routes)
//! ```

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dispatcher::{Orchestra, OrchestraError, PacketSelection};
use crate::event::TopologyEvent;
use crate::linkaddr::LinkAddress;
use crate::packet::Packet;
use crate::routing::RoutingTable;
use crate::schedule::TschSchedule;

/// Default depth of the request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver task has stopped.
    #[error("orchestra driver is not running")]
    Closed,

    #[error(transparent)]
    Orchestra(#[from] OrchestraError),
}

/// Point-in-time view of the driven node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSnapshot {
    pub time_source: Option<LinkAddress>,
    pub children: Vec<LinkAddress>,
    /// [`TschSchedule::dump`] output.
    pub schedule: String,
}

/// Requests understood by [`OrchestraDriver`].
#[derive(Debug)]
pub enum DriverMessage {
    Topology {
        event: TopologyEvent,
        reply: oneshot::Sender<Result<(), OrchestraError>>,
    },
    PacketReady {
        packet: Packet,
        reply: oneshot::Sender<Option<PacketSelection>>,
    },
    Snapshot {
        reply: oneshot::Sender<DriverSnapshot>,
    },
}

/// Cloneable sender side.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<DriverMessage>,
}

impl DriverHandle {
    pub async fn time_source_changed(
        &self,
        old: Option<LinkAddress>,
        new: Option<LinkAddress>,
    ) -> Result<(), DriverError> {
        self.topology(TopologyEvent::TimeSourceChanged { old, new }).await
    }

    pub async fn child_added(&self, addr: LinkAddress) -> Result<(), DriverError> {
        self.topology(TopologyEvent::ChildAdded { addr }).await
    }

    pub async fn child_removed(&self, addr: LinkAddress) -> Result<(), DriverError> {
        self.topology(TopologyEvent::ChildRemoved { addr }).await
    }

    /// Delivers any topology event and waits until every rule has seen it.
    pub async fn topology(&self, event: TopologyEvent) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverMessage::Topology { event, reply }).await?;
        rx.await
            .map_err(|_| DriverError::Closed)?
            .map_err(DriverError::from)
    }

    /// Asks where `packet` should be transmitted.
    pub async fn packet_ready(
        &self,
        packet: Packet,
    ) -> Result<Option<PacketSelection>, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverMessage::PacketReady { packet, reply })
            .await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn snapshot(&self) -> Result<DriverSnapshot, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverMessage::Snapshot { reply }).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    async fn send(&self, msg: DriverMessage) -> Result<(), DriverError> {
        self.tx.send(msg).await.map_err(|_| DriverError::Closed)
    }
}

/// Receiver side; owns the dispatcher and the routing table.
pub struct OrchestraDriver<S: TschSchedule, R: RoutingTable> {
    orchestra: Orchestra<S>,
    routes: R,
    rx: mpsc::Receiver<DriverMessage>,
}

/// Creates a handle/driver pair.  `orchestra` must already be initialized.
pub fn channel<S, R>(
    orchestra: Orchestra<S>,
    routes: R,
    capacity: usize,
) -> (DriverHandle, OrchestraDriver<S, R>)
where
    S: TschSchedule,
    R: RoutingTable,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        DriverHandle { tx },
        OrchestraDriver {
            orchestra,
            routes,
            rx,
        },
    )
}

impl<S: TschSchedule, R: RoutingTable> OrchestraDriver<S, R> {
    /// Processes requests until every [`DriverHandle`] is dropped, then hands
    /// the dispatcher and routing table back.
    pub async fn run(mut self) -> (Orchestra<S>, R) {
        info!(node = %self.orchestra.node_addr(), "orchestra driver started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                DriverMessage::Topology { event, reply } => {
                    debug!(%event, "topology event");
                    self.routes.observe(&event);
                    let result = self.orchestra.handle_event(&event, &self.routes);
                    if let Err(e) = &result {
                        warn!(%event, error = %e, "topology event only partially applied");
                    }
                    let _ = reply.send(result);
                }
                DriverMessage::PacketReady { packet, reply } => {
                    let _ = reply.send(self.orchestra.select_packet(&packet, &self.routes));
                }
                DriverMessage::Snapshot { reply } => {
                    let _ = reply.send(DriverSnapshot {
                        time_source: self.orchestra.time_source().copied(),
                        children: self.routes.children(),
                        schedule: self.orchestra.schedule().dump(),
                    });
                }
            }
        }

        info!("orchestra driver stopped, all handles dropped");
        (self.orchestra, self.routes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
