//! Server-side listener reconciliation.
//!
//! Every tick compares the ports the schedule wants open with the listeners
//! in the registry. Per offset the slot moves `absent -> open -> expired ->
//! absent`:
//!
//! 1. listeners whose window has ended are closed and removed
//! 2. every active window without a listener gets one
//!
//! A port that cannot be bound is retried on the next tick. Nothing a single
//! tick encounters stops the loop; only cancellation does.

use crate::config::NodeSettings;
use crate::error::Result;
use crate::forwarder::Forwarder;
use crate::registry::{ListenerEntry, ListenerRegistry};
use crate::serve::spawn_listener;
use porthop_core::{PortAssignment, PortSchedule, Protocol, unix_now};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What one reconciliation tick changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Listeners opened
    pub opened: Vec<PortAssignment>,
    /// Listeners closed because their window ended
    pub closed: Vec<PortAssignment>,
    /// Active windows skipped because another offset already serves the port
    pub deferred: Vec<PortAssignment>,
    /// Active windows whose port could not be bound
    pub failed: Vec<PortAssignment>,
}

impl TickReport {
    /// Whether the tick opened or closed anything
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.opened.is_empty() || !self.closed.is_empty()
    }
}

/// Control loop keeping the registry in line with the schedule
pub struct Reconciler {
    schedule: Arc<PortSchedule>,
    registry: Arc<ListenerRegistry>,
    protocol: Protocol,
    listen_ip: IpAddr,
    forwarder: Arc<dyn Forwarder>,
    settings: NodeSettings,
    token: CancellationToken,
}

impl Reconciler {
    /// Create a reconciler.
    ///
    /// Listener tokens are children of `token`, so cancelling it stops the
    /// loop and every accept loop at once.
    #[must_use]
    pub fn new(
        schedule: Arc<PortSchedule>,
        registry: Arc<ListenerRegistry>,
        protocol: Protocol,
        listen_ip: IpAddr,
        forwarder: Arc<dyn Forwarder>,
        settings: NodeSettings,
        token: CancellationToken,
    ) -> Self {
        Self {
            schedule,
            registry,
            protocol,
            listen_ip,
            forwarder,
            settings,
            token,
        }
    }

    /// Registry this reconciler maintains
    #[must_use]
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Run one reconciliation pass at `now`.
    pub async fn tick(&self, now: i64) -> TickReport {
        let mut report = TickReport::default();

        for info in self.registry.remove_expired(now).await {
            tracing::info!(
                "Closed {} listener on port {} (offset {:+}, window ended at {})",
                self.protocol,
                info.port(),
                info.offset(),
                info.assignment.window.valid_end
            );
            report.closed.push(info.assignment);
        }

        for assignment in self.schedule.active_ports(now) {
            if self.registry.contains(assignment.offset()).await {
                continue;
            }

            if let Some(holder) = self.registry.port_holder(assignment.port).await {
                tracing::debug!(
                    "Port {} already served for offset {:+}, deferring offset {:+}",
                    assignment.port,
                    holder.offset(),
                    assignment.offset()
                );
                report.deferred.push(assignment);
                continue;
            }

            match self.open(assignment).await {
                Ok(entry) => {
                    let info = entry.info();
                    if self.registry.insert(entry).await {
                        tracing::info!(
                            "Opened {} listener on {} (offset {:+}, valid {}..{})",
                            self.protocol,
                            info.local_addr,
                            info.offset(),
                            assignment.window.valid_start,
                            assignment.window.valid_end
                        );
                        report.opened.push(assignment);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to open listener on port {} (offset {:+}), retrying next tick: {}",
                        assignment.port,
                        assignment.offset(),
                        e
                    );
                    report.failed.push(assignment);
                }
            }
        }

        report
    }

    async fn open(&self, assignment: PortAssignment) -> Result<ListenerEntry> {
        let addr = SocketAddr::new(self.listen_ip, assignment.port);
        let token = self.token.child_token();

        let (local_addr, task) = spawn_listener(
            self.protocol,
            addr,
            token.clone(),
            Arc::clone(&self.forwarder),
            self.settings.accept_backoff,
        )
        .await?;

        Ok(ListenerEntry::new(assignment, local_addr, token, task))
    }

    /// Tick until cancelled, then close every listener.
    ///
    /// The first tick runs immediately.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick(unix_now()).await;
                    if report.changed() {
                        tracing::debug!(
                            "Tick: {} opened, {} closed, {} listening",
                            report.opened.len(),
                            report.closed.len(),
                            self.registry.len().await
                        );
                    }
                }
            }
        }

        let closed = self.registry.shutdown().await;
        tracing::info!("Reconciler stopped, closed {} listeners", closed);
    }
}
