//! Test wrapper around [`MemoryStore`] that lets a test step in between a
//! caller's read and its follow-up write.

use super::{EntityStore, MemoryStore, RequestTransition, StoreError, TransitionOutcome};
use crate::entities::{Donation, DonationStatus, DonationType, NewDonation, NewRequest, Request};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Parks one `get_request` call after it has read the row.
pub(crate) struct ReadPause {
    pub reached: oneshot::Sender<()>,
    pub resume: oneshot::Receiver<()>,
}

pub(crate) struct InterleavedStore {
    inner: Arc<MemoryStore>,
    pause_request_read: Mutex<Option<ReadPause>>,
    claim_before_donation_update: Mutex<Option<(NewRequest, OffsetDateTime)>>,
    fail_sweep_listing: AtomicBool,
    sweep_listings: AtomicUsize,
}

impl InterleavedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            pause_request_read: Mutex::new(None),
            claim_before_donation_update: Mutex::new(None),
            fail_sweep_listing: AtomicBool::new(false),
            sweep_listings: AtomicUsize::new(0),
        }
    }

    /// The next `get_request` returns only once `resume` fires.
    pub fn pause_next_request_read(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        *self.pause_request_read.lock().unwrap() = Some(ReadPause {
            reached: reached_tx,
            resume: resume_rx,
        });
        (reached_rx, resume_tx)
    }

    /// The next donation compare-and-set first lets `claim`, made at
    /// `claimed_at`, win the donation.
    pub fn claim_before_next_donation_update(
        &self,
        claim: NewRequest,
        claimed_at: OffsetDateTime,
    ) {
        *self.claim_before_donation_update.lock().unwrap() = Some((claim, claimed_at));
    }

    pub fn fail_sweep_listing(&self, fail: bool) {
        self.fail_sweep_listing.store(fail, Ordering::SeqCst);
    }

    pub fn sweep_listings(&self) -> usize {
        self.sweep_listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStore for InterleavedStore {
    async fn create_donation(
        &self,
        new: NewDonation,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError> {
        self.inner.create_donation(new, now).await
    }

    async fn get_donation(&self, donation_id: Uuid) -> Result<Option<Donation>, StoreError> {
        self.inner.get_donation(donation_id).await
    }

    async fn list_available(
        &self,
        donation_type: DonationType,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        self.inner.list_available(donation_type, now).await
    }

    async fn list_donations_by_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>, StoreError> {
        self.inner.list_donations_by_donor(donor_id).await
    }

    async fn create_request(
        &self,
        new: NewRequest,
        now: OffsetDateTime,
    ) -> Result<(Donation, Request), StoreError> {
        self.inner.create_request(new, now).await
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<Request>, StoreError> {
        let read = self.inner.get_request(request_id).await;
        let pause = self.pause_request_read.lock().unwrap().take();
        if let Some(pause) = pause {
            let _ = pause.reached.send(());
            let _ = pause.resume.await;
        }
        read
    }

    async fn requests_by_requester(&self, requester_id: Uuid) -> Result<Vec<Request>, StoreError> {
        self.inner.requests_by_requester(requester_id).await
    }

    async fn requests_by_volunteer(&self, volunteer_id: Uuid) -> Result<Vec<Request>, StoreError> {
        self.inner.requests_by_volunteer(volunteer_id).await
    }

    async fn requests_by_donation(&self, donation_id: Uuid) -> Result<Vec<Request>, StoreError> {
        self.inner.requests_by_donation(donation_id).await
    }

    async fn list_open_requests(&self) -> Result<Vec<Request>, StoreError> {
        self.inner.list_open_requests().await
    }

    async fn update_donation_status(
        &self,
        donation_id: Uuid,
        expected: DonationStatus,
        new: DonationStatus,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError> {
        let claim = self.claim_before_donation_update.lock().unwrap().take();
        if let Some((claim, claimed_at)) = claim {
            self.inner.create_request(claim, claimed_at).await?;
        }
        self.inner
            .update_donation_status(donation_id, expected, new, now)
            .await
    }

    async fn update_request_status(
        &self,
        transition: RequestTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        self.inner.update_request_status(transition).await
    }

    async fn list_sweep_candidates(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        self.sweep_listings.fetch_add(1, Ordering::SeqCst);
        if self.fail_sweep_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.list_sweep_candidates(now).await
    }

    async fn list_claimed_donations(&self) -> Result<Vec<Donation>, StoreError> {
        self.inner.list_claimed_donations().await
    }

    async fn list_live_requests(&self) -> Result<Vec<Request>, StoreError> {
        self.inner.list_live_requests().await
    }
}
