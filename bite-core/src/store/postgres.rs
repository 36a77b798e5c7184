use super::{
    EntityKind, EntityStore, RequestTransition, StaleState, StoreError, TransitionOutcome,
};
use crate::entities::{
    CompareAndSetDonationStatus, Donation, DonationStatus, DonationType, GetDonationById,
    GetRequestById, InsertDonation, ListAvailableDonations, ListClaimedDonations,
    ListDonationsByDonor, ListLiveRequests, ListOpenRequests, ListRequests, ListSweepCandidates,
    NewDonation, NewRequest, Request, RequestFilter,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

/// [`EntityStore`] on PostgreSQL.
///
/// A failed conditional update is followed by a plain read of the row so the
/// caller learns whether it is missing or just in another state.
#[derive(Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

fn donation_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        kind: EntityKind::Donation,
        id,
    }
}

fn request_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        kind: EntityKind::Request,
        id,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Explain why a claim on `donation` did not match.
fn claim_miss(donation: Option<Donation>, donation_id: Uuid) -> StoreError {
    match donation {
        None => donation_not_found(donation_id),
        Some(d) if d.status == DonationStatus::Available => {
            StoreError::Stale(StaleState::DonationExpired { donation_id })
        }
        Some(d) => StoreError::Stale(StaleState::Donation {
            donation_id,
            expected: DonationStatus::Available,
            actual: d.status,
        }),
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn create_donation(
        &self,
        new: NewDonation,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError> {
        let donation = new.into_donation(Uuid::now_v7(), now);
        Ok(self.db.process(InsertDonation { donation }).await?)
    }

    async fn get_donation(&self, donation_id: Uuid) -> Result<Option<Donation>, StoreError> {
        Ok(self.db.process(GetDonationById { donation_id }).await?)
    }

    async fn list_available(
        &self,
        donation_type: DonationType,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        Ok(self
            .db
            .process(ListAvailableDonations { donation_type, now })
            .await?)
    }

    async fn list_donations_by_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>, StoreError> {
        Ok(self.db.process(ListDonationsByDonor { donor_id }).await?)
    }

    #[tracing::instrument(skip_all, err, fields(donation_id = %new.donation_id))]
    async fn create_request(
        &self,
        new: NewRequest,
        now: OffsetDateTime,
    ) -> Result<(Donation, Request), StoreError> {
        let donation_id = new.donation_id;
        let mut tx = self.db.pool.begin().await?;

        let Some(donation) = Donation::claim_tx(&mut tx, donation_id, now).await? else {
            let current = Donation::get_tx(&mut tx, donation_id).await?;
            tx.rollback().await?;
            return Err(claim_miss(current, donation_id));
        };

        let request = new.into_request(
            Uuid::now_v7(),
            Some(donation.pickup_address.clone()),
            now,
        );
        let request = match Request::insert_tx(&mut tx, request).await {
            Ok(request) => request,
            // The partial unique index on live requests caught a concurrent claim.
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Err(StoreError::Stale(StaleState::Donation {
                    donation_id,
                    expected: DonationStatus::Available,
                    actual: DonationStatus::Requested,
                }));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok((donation, request))
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<Request>, StoreError> {
        Ok(self.db.process(GetRequestById { request_id }).await?)
    }

    async fn requests_by_requester(&self, requester_id: Uuid) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .db
            .process(ListRequests {
                filter: RequestFilter::Requester(requester_id),
            })
            .await?)
    }

    async fn requests_by_volunteer(&self, volunteer_id: Uuid) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .db
            .process(ListRequests {
                filter: RequestFilter::Volunteer(volunteer_id),
            })
            .await?)
    }

    async fn requests_by_donation(&self, donation_id: Uuid) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .db
            .process(ListRequests {
                filter: RequestFilter::Donation(donation_id),
            })
            .await?)
    }

    async fn list_open_requests(&self) -> Result<Vec<Request>, StoreError> {
        Ok(self.db.process(ListOpenRequests).await?)
    }

    async fn update_donation_status(
        &self,
        donation_id: Uuid,
        expected: DonationStatus,
        new: DonationStatus,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError> {
        let updated = self
            .db
            .process(CompareAndSetDonationStatus {
                donation_id,
                expected,
                new,
                now,
            })
            .await?;
        if let Some(donation) = updated {
            return Ok(donation);
        }
        match self.db.process(GetDonationById { donation_id }).await? {
            None => Err(donation_not_found(donation_id)),
            Some(current) => Err(StoreError::Stale(StaleState::Donation {
                donation_id,
                expected,
                actual: current.status,
            })),
        }
    }

    #[tracing::instrument(skip_all, err, fields(request_id = %transition.request_id))]
    async fn update_request_status(
        &self,
        transition: RequestTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let RequestTransition {
            request_id,
            expected,
            new,
            assign_volunteer,
            donation,
            now,
        } = transition;
        let mut tx = self.db.pool.begin().await?;

        let updated =
            Request::compare_and_set_status_tx(&mut tx, request_id, expected, new, assign_volunteer, now)
                .await?;
        let Some(request) = updated else {
            let current = Request::get_tx(&mut tx, request_id).await?;
            tx.rollback().await?;
            return Err(match current {
                None => request_not_found(request_id),
                Some(r) if r.status != expected => StoreError::Stale(StaleState::Request {
                    request_id,
                    expected,
                    actual: r.status,
                }),
                Some(_) => StoreError::Stale(StaleState::AlreadyAssigned { request_id }),
            });
        };

        let donation = match donation {
            Some(mirror) => {
                let donation_id = request.donation_id;
                let moved = Donation::compare_and_set_status_tx(
                    &mut tx,
                    donation_id,
                    mirror.expected,
                    mirror.new,
                    now,
                )
                .await?;
                let Some(moved) = moved else {
                    let current = Donation::get_tx(&mut tx, donation_id).await?;
                    tx.rollback().await?;
                    return Err(match current {
                        None => donation_not_found(donation_id),
                        Some(d) => StoreError::Stale(StaleState::Donation {
                            donation_id,
                            expected: mirror.expected,
                            actual: d.status,
                        }),
                    });
                };
                Some(moved)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(TransitionOutcome { request, donation })
    }

    async fn list_sweep_candidates(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        Ok(self.db.process(ListSweepCandidates { now }).await?)
    }

    async fn list_claimed_donations(&self) -> Result<Vec<Donation>, StoreError> {
        Ok(self.db.process(ListClaimedDonations).await?)
    }

    async fn list_live_requests(&self) -> Result<Vec<Request>, StoreError> {
        Ok(self.db.process(ListLiveRequests).await?)
    }
}
