//! In-process [`EntityStore`].
//!
//! All state sits behind one `RwLock`. A compare-and-set checks and writes
//! under a single write guard, with no `.await` in between, so it is as
//! atomic as the PostgreSQL conditional update.

use super::{
    DonationMirror, EntityKind, EntityStore, RequestTransition, StaleState, StoreError,
    TransitionOutcome,
};
use crate::entities::{
    Donation, DonationStatus, DonationType, NewDonation, NewRequest, Request, RequestStatus,
};
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    donations: HashMap<Uuid, Donation>,
    requests: HashMap<Uuid, Request>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut requests: Vec<Request>) -> Vec<Request> {
    requests.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.request_id.cmp(&a.request_id))
    });
    requests
}

fn check_mirror(donation: &Donation, mirror: &DonationMirror) -> Result<(), StoreError> {
    if donation.status != mirror.expected {
        return Err(StoreError::Stale(StaleState::Donation {
            donation_id: donation.donation_id,
            expected: mirror.expected,
            actual: donation.status,
        }));
    }
    Ok(())
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_donation(
        &self,
        new: NewDonation,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError> {
        let donation = new.into_donation(Uuid::now_v7(), now);
        let mut tables = self.tables.write().await;
        tables
            .donations
            .insert(donation.donation_id, donation.clone());
        Ok(donation)
    }

    async fn get_donation(&self, donation_id: Uuid) -> Result<Option<Donation>, StoreError> {
        Ok(self.tables.read().await.donations.get(&donation_id).cloned())
    }

    async fn list_available(
        &self,
        donation_type: DonationType,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read().await;
        let mut available: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| d.donation_type == donation_type && d.is_claimable(now))
            .cloned()
            .collect();
        available.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then(a.donation_id.cmp(&b.donation_id))
        });
        Ok(available)
    }

    async fn list_donations_by_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read().await;
        let mut donations: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| d.donor_id == donor_id)
            .cloned()
            .collect();
        donations.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.donation_id.cmp(&a.donation_id))
        });
        Ok(donations)
    }

    async fn create_request(
        &self,
        new: NewRequest,
        now: OffsetDateTime,
    ) -> Result<(Donation, Request), StoreError> {
        let mut tables = self.tables.write().await;
        let donation = tables
            .donations
            .get_mut(&new.donation_id)
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Donation,
                id: new.donation_id,
            })?;

        if donation.status != DonationStatus::Available {
            return Err(StoreError::Stale(StaleState::Donation {
                donation_id: donation.donation_id,
                expected: DonationStatus::Available,
                actual: donation.status,
            }));
        }
        if donation.expires_at <= now {
            return Err(StoreError::Stale(StaleState::DonationExpired {
                donation_id: donation.donation_id,
            }));
        }

        donation.status = DonationStatus::Requested;
        donation.updated_at = now;
        let donation = donation.clone();

        let request = new.into_request(
            Uuid::now_v7(),
            Some(donation.pickup_address.clone()),
            now,
        );
        tables.requests.insert(request.request_id, request.clone());
        Ok((donation, request))
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<Request>, StoreError> {
        Ok(self.tables.read().await.requests.get(&request_id).cloned())
    }

    async fn requests_by_requester(&self, requester_id: Uuid) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .requests
                .values()
                .filter(|r| r.requester_id == requester_id)
                .cloned()
                .collect(),
        ))
    }

    async fn requests_by_volunteer(&self, volunteer_id: Uuid) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .requests
                .values()
                .filter(|r| r.assigned_volunteer == Some(volunteer_id))
                .cloned()
                .collect(),
        ))
    }

    async fn requests_by_donation(&self, donation_id: Uuid) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .requests
                .values()
                .filter(|r| r.donation_id == donation_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_open_requests(&self) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read().await;
        let mut open = newest_first(
            tables
                .requests
                .values()
                .filter(|r| r.status == RequestStatus::Pending)
                .cloned()
                .collect(),
        );
        open.reverse();
        Ok(open)
    }

    async fn update_donation_status(
        &self,
        donation_id: Uuid,
        expected: DonationStatus,
        new: DonationStatus,
        now: OffsetDateTime,
    ) -> Result<Donation, StoreError> {
        let mut tables = self.tables.write().await;
        let donation = tables
            .donations
            .get_mut(&donation_id)
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Donation,
                id: donation_id,
            })?;
        if donation.status != expected {
            return Err(StoreError::Stale(StaleState::Donation {
                donation_id,
                expected,
                actual: donation.status,
            }));
        }
        donation.status = new;
        donation.updated_at = now;
        Ok(donation.clone())
    }

    async fn update_request_status(
        &self,
        transition: RequestTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        let Tables {
            donations,
            requests,
        } = &mut *tables;

        let request = requests
            .get_mut(&transition.request_id)
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Request,
                id: transition.request_id,
            })?;
        if request.status != transition.expected {
            return Err(StoreError::Stale(StaleState::Request {
                request_id: request.request_id,
                expected: transition.expected,
                actual: request.status,
            }));
        }
        if transition.assign_volunteer.is_some() && request.assigned_volunteer.is_some() {
            return Err(StoreError::Stale(StaleState::AlreadyAssigned {
                request_id: request.request_id,
            }));
        }

        // Validate the donation half before touching anything.
        let donation = match &transition.donation {
            Some(mirror) => {
                let donation =
                    donations
                        .get_mut(&request.donation_id)
                        .ok_or(StoreError::NotFound {
                            kind: EntityKind::Donation,
                            id: request.donation_id,
                        })?;
                check_mirror(donation, mirror)?;
                donation.status = mirror.new;
                donation.updated_at = transition.now;
                Some(donation.clone())
            }
            None => None,
        };

        request.status = transition.new;
        if let Some(volunteer) = transition.assign_volunteer {
            request.assigned_volunteer = Some(volunteer);
        }
        request.updated_at = transition.now;

        Ok(TransitionOutcome {
            request: request.clone(),
            donation,
        })
    }

    async fn list_sweep_candidates(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read().await;
        let mut candidates: Vec<Donation> = tables
            .donations
            .values()
            .filter(|d| {
                matches!(
                    d.status,
                    DonationStatus::Available | DonationStatus::Requested
                ) && d.expires_at <= now
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(candidates)
    }

    async fn list_claimed_donations(&self) -> Result<Vec<Donation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .donations
            .values()
            .filter(|d| {
                matches!(
                    d.status,
                    DonationStatus::Requested | DonationStatus::Assigned
                )
            })
            .cloned()
            .collect())
    }

    async fn list_live_requests(&self) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::RequesterType;
    use time::Duration;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn new_donation(donation_type: DonationType, expires_in: Duration) -> NewDonation {
        NewDonation {
            donor_id: Uuid::now_v7(),
            food_name: "Vegetable biryani".into(),
            description: "Packed in foil trays".into(),
            quantity: 10,
            donation_type,
            expires_at: now() + expires_in,
            pickup_address: "12 MG Road".into(),
            pickup_latitude: Some(12.97),
            pickup_longitude: Some(77.59),
            photo_url: None,
        }
    }

    fn claim(donation_id: Uuid) -> NewRequest {
        NewRequest {
            donation_id,
            requester_id: Uuid::now_v7(),
            requester_type: RequesterType::Ngo,
            delivery_address: None,
        }
    }

    #[tokio::test]
    async fn list_available_filters_and_orders_by_expiry() {
        let store = MemoryStore::new();
        let late = store
            .create_donation(new_donation(DonationType::Human, Duration::hours(3)), now())
            .await
            .unwrap();
        let soon = store
            .create_donation(new_donation(DonationType::Human, Duration::hours(1)), now())
            .await
            .unwrap();
        store
            .create_donation(new_donation(DonationType::Dog, Duration::hours(1)), now())
            .await
            .unwrap();
        store
            .create_donation(new_donation(DonationType::Human, Duration::minutes(-5)), now())
            .await
            .unwrap();

        let listed = store.list_available(DonationType::Human, now()).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|d| d.donation_id).collect();
        assert_eq!(ids, vec![soon.donation_id, late.donation_id]);
    }

    #[tokio::test]
    async fn create_request_moves_donation_and_inserts_pending_request() {
        let store = MemoryStore::new();
        let donation = store
            .create_donation(new_donation(DonationType::Human, Duration::hours(1)), now())
            .await
            .unwrap();

        let (donation, request) = store
            .create_request(claim(donation.donation_id), now())
            .await
            .unwrap();
        assert_eq!(donation.status, DonationStatus::Requested);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.assigned_volunteer, None);
        assert_eq!(request.pickup_address.as_deref(), Some("12 MG Road"));

        let second = store.create_request(claim(donation.donation_id), now()).await;
        assert!(matches!(
            second,
            Err(StoreError::Stale(StaleState::Donation {
                actual: DonationStatus::Requested,
                ..
            }))
        ));
        assert_eq!(
            store
                .requests_by_donation(donation.donation_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn create_request_refuses_expired_donation() {
        let store = MemoryStore::new();
        let donation = store
            .create_donation(new_donation(DonationType::Human, Duration::minutes(1)), now())
            .await
            .unwrap();
        let later = now() + Duration::minutes(2);
        let result = store.create_request(claim(donation.donation_id), later).await;
        assert!(matches!(
            result,
            Err(StoreError::Stale(StaleState::DonationExpired { .. }))
        ));
        let stored = store.get_donation(donation.donation_id).await.unwrap().unwrap();
        assert_eq!(stored.status, DonationStatus::Available);
    }

    #[tokio::test]
    async fn update_donation_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let donation = store
            .create_donation(new_donation(DonationType::Compost, Duration::hours(1)), now())
            .await
            .unwrap();

        let stale = store
            .update_donation_status(
                donation.donation_id,
                DonationStatus::Requested,
                DonationStatus::Assigned,
                now(),
            )
            .await;
        assert!(matches!(stale, Err(StoreError::Stale(_))));

        let expired = store
            .update_donation_status(
                donation.donation_id,
                DonationStatus::Available,
                DonationStatus::Expired,
                now(),
            )
            .await
            .unwrap();
        assert_eq!(expired.status, DonationStatus::Expired);

        let missing = store
            .update_donation_status(
                Uuid::now_v7(),
                DonationStatus::Available,
                DonationStatus::Expired,
                now(),
            )
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn failed_donation_mirror_leaves_request_untouched() {
        let store = MemoryStore::new();
        let donation = store
            .create_donation(new_donation(DonationType::Human, Duration::hours(1)), now())
            .await
            .unwrap();
        let (_, request) = store
            .create_request(claim(donation.donation_id), now())
            .await
            .unwrap();

        let result = store
            .update_request_status(RequestTransition {
                request_id: request.request_id,
                expected: RequestStatus::Pending,
                new: RequestStatus::Accepted,
                assign_volunteer: Some(Uuid::now_v7()),
                donation: Some(DonationMirror {
                    expected: DonationStatus::Available,
                    new: DonationStatus::Assigned,
                }),
                now: now(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Stale(_))));

        let stored = store.get_request(request.request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert_eq!(stored.assigned_volunteer, None);
    }

    #[tokio::test]
    async fn accept_transition_assigns_volunteer_and_mirrors_donation() {
        let store = MemoryStore::new();
        let donation = store
            .create_donation(new_donation(DonationType::Human, Duration::hours(1)), now())
            .await
            .unwrap();
        let (_, request) = store
            .create_request(claim(donation.donation_id), now())
            .await
            .unwrap();
        let volunteer = Uuid::now_v7();

        let outcome = store
            .update_request_status(RequestTransition {
                request_id: request.request_id,
                expected: RequestStatus::Pending,
                new: RequestStatus::Accepted,
                assign_volunteer: Some(volunteer),
                donation: Some(DonationMirror {
                    expected: DonationStatus::Requested,
                    new: DonationStatus::Assigned,
                }),
                now: now(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.request.assigned_volunteer, Some(volunteer));
        assert_eq!(
            outcome.donation.map(|d| d.status),
            Some(DonationStatus::Assigned)
        );
        assert_eq!(
            store.requests_by_volunteer(volunteer).await.unwrap().len(),
            1
        );
        assert!(store.list_open_requests().await.unwrap().is_empty());
    }
}
