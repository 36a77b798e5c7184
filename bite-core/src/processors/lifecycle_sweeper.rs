//! LifecycleSweeper processor.
//!
//! On every tick the sweeper:
//! - moves `Available` donations past expiry to `Expired` (compare-and-set,
//!   so a claim that lands first simply wins)
//! - reports `Requested` donations past expiry instead of touching them
//! - cross-checks claimed donations against live requests and reports
//!   anything that does not line up
//!
//! A finding is announced once, when it first appears; it is announced
//! again only after it has cleared for at least one sweep.
//!
//! Store failures back off exponentially, capped at the sweep interval.
//! The sweeper never holds anything the request path waits on.

use crate::clock::Clock;
use crate::config::{ConfigStore, ConfigWatcher, SweeperConfig};
use crate::entities::{Donation, DonationStatus, Request};
use crate::events::{EngineEvent, EngineEventSender, emit};
use crate::store::{EntityStore, StaleState, StoreError};
use bite_sdk::objects::AuditReason;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Highest exponent used for the failure backoff.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// A record the sweeper will not fix by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditFinding {
    pub donation_id: Uuid,
    pub request_id: Option<Uuid>,
    pub reason: AuditReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    /// Expiry attempts that lost to a concurrent change.
    pub lost_races: usize,
    pub findings: Vec<AuditFinding>,
}

/// Delay before the next attempt after `failures` consecutive failed sweeps.
pub fn calculate_retry_delay(failures: u32, cap: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_secs(2u64.pow(exponent)).min(cap)
}

pub struct LifecycleSweeper {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    events: EngineEventSender,
    /// Findings already announced and still present at the last sweep.
    announced: Mutex<HashSet<AuditFinding>>,
}

impl LifecycleSweeper {
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        events: EngineEventSender,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            announced: Mutex::new(HashSet::new()),
        }
    }

    /// Sweep on the configured interval until shutdown is signaled.
    ///
    /// The first sweep runs immediately. A config update takes effect at
    /// once by rescheduling the pending sleep.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        config_store: ConfigStore<SweeperConfig>,
        mut config_watcher: ConfigWatcher,
    ) {
        let mut interval = config_store.read().await.interval;
        info!(interval_secs = interval.as_secs(), "LifecycleSweeper started");

        let mut failures: u32 = 0;
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("LifecycleSweeper received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    interval = config_store.read().await.interval;
                    delay = if failures == 0 {
                        interval
                    } else {
                        calculate_retry_delay(failures, interval)
                    };
                    info!(interval_secs = interval.as_secs(), "LifecycleSweeper rescheduled");
                }

                _ = tokio::time::sleep(delay) => {
                    match self.sweep_once().await {
                        Ok(report) => {
                            failures = 0;
                            delay = interval;
                            if report.expired > 0 || !report.findings.is_empty() {
                                info!(
                                    expired = report.expired,
                                    lost_races = report.lost_races,
                                    findings = report.findings.len(),
                                    "Sweep finished"
                                );
                            }
                        }
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            delay = calculate_retry_delay(failures, interval);
                            error!(
                                error = %e,
                                failures,
                                retry_in_secs = delay.as_secs(),
                                "Sweep failed"
                            );
                        }
                    }
                }
            }
        }

        info!("LifecycleSweeper shutdown complete");
    }

    /// One pass: expiry first, then reconciliation.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for donation in self.store.list_sweep_candidates(now).await? {
            match donation.status {
                DonationStatus::Available => self.expire(&donation, &mut report).await?,
                DonationStatus::Requested => {
                    let request_id = self.live_request_id(donation.donation_id).await?;
                    self.flag(
                        &mut report,
                        AuditFinding {
                            donation_id: donation.donation_id,
                            request_id,
                            reason: AuditReason::ExpiredWhileRequested,
                        },
                    );
                }
                _ => {}
            }
        }

        self.reconcile(&mut report).await?;
        self.announced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|finding| report.findings.contains(finding));
        Ok(report)
    }

    async fn expire(&self, donation: &Donation, report: &mut SweepReport) -> Result<(), StoreError> {
        let result = self
            .store
            .update_donation_status(
                donation.donation_id,
                DonationStatus::Available,
                DonationStatus::Expired,
                self.clock.now(),
            )
            .await;
        match result {
            Ok(expired) => {
                report.expired += 1;
                debug!(donation_id = %expired.donation_id, "Donation expired");
                emit(
                    &self.events,
                    EngineEvent::DonationStatusChanged {
                        donation_id: expired.donation_id,
                        status: expired.status,
                    },
                );
                Ok(())
            }
            Err(StoreError::Stale(StaleState::Donation { actual, .. })) => {
                report.lost_races += 1;
                debug!(
                    donation_id = %donation.donation_id,
                    %actual,
                    "Expiry lost to a concurrent change"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn live_request_id(&self, donation_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .store
            .requests_by_donation(donation_id)
            .await?
            .into_iter()
            .find(|r| !r.status.is_terminal())
            .map(|r| r.request_id))
    }

    /// Report claimed donations without a live request and live requests
    /// whose donation is not in the mirrored status.
    ///
    /// The two listings are not one snapshot, so every candidate is re-read
    /// before it is reported.
    async fn reconcile(&self, report: &mut SweepReport) -> Result<(), StoreError> {
        let claimed = self.store.list_claimed_donations().await?;
        let live = self.store.list_live_requests().await?;

        let by_donation: HashMap<Uuid, &Request> =
            live.iter().map(|r| (r.donation_id, r)).collect();
        let already_flagged: Vec<Uuid> = report.findings.iter().map(|f| f.donation_id).collect();

        for donation in &claimed {
            if by_donation.contains_key(&donation.donation_id)
                || already_flagged.contains(&donation.donation_id)
            {
                continue;
            }
            let Some(current) = self.store.get_donation(donation.donation_id).await? else {
                continue;
            };
            if !matches!(
                current.status,
                DonationStatus::Requested | DonationStatus::Assigned
            ) {
                continue;
            }
            if self.live_request_id(current.donation_id).await?.is_none() {
                self.flag(
                    report,
                    AuditFinding {
                        donation_id: current.donation_id,
                        request_id: None,
                        reason: AuditReason::OrphanedClaim,
                    },
                );
            }
        }

        for request in &live {
            if already_flagged.contains(&request.donation_id) {
                continue;
            }
            let Some(current) = self.store.get_request(request.request_id).await? else {
                continue;
            };
            if current.status.is_terminal() {
                continue;
            }
            let Some(donation) = self.store.get_donation(current.donation_id).await? else {
                continue;
            };
            if donation.status != current.status.mirrored_donation_status() {
                self.flag(
                    report,
                    AuditFinding {
                        donation_id: donation.donation_id,
                        request_id: Some(current.request_id),
                        reason: AuditReason::StatusMismatch,
                    },
                );
            }
        }
        Ok(())
    }

    fn flag(&self, report: &mut SweepReport, finding: AuditFinding) {
        report.findings.push(finding);
        let first_seen = self
            .announced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(finding);
        if !first_seen {
            debug!(
                donation_id = %finding.donation_id,
                reason = ?finding.reason,
                "Audit candidate still present"
            );
            return;
        }
        warn!(
            donation_id = %finding.donation_id,
            request_id = ?finding.request_id,
            reason = ?finding.reason,
            "Audit candidate"
        );
        emit(
            &self.events,
            EngineEvent::AuditCandidate {
                donation_id: finding.donation_id,
                request_id: finding.request_id,
                reason: finding.reason,
            },
        );
    }
}
