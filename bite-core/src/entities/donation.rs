use super::{DonationStatus, DonationType};
use crate::framework::DatabaseProcessor;
use bite_sdk::objects::{DonationResponse, PickupLocation};
use compact_str::CompactString;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Donation {
    pub donation_id: Uuid,
    pub donor_id: Uuid,
    pub food_name: CompactString,
    pub description: String,
    pub quantity: i32,
    pub donation_type: DonationType,
    pub status: DonationStatus,
    pub expires_at: OffsetDateTime,
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub photo_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Donation {
    /// Whether the donation can still be claimed at `now`.
    pub fn is_claimable(&self, now: OffsetDateTime) -> bool {
        self.status == DonationStatus::Available && self.expires_at > now
    }
}

impl From<&Donation> for DonationResponse {
    fn from(d: &Donation) -> Self {
        DonationResponse {
            donation_id: d.donation_id,
            donor_id: d.donor_id,
            food_name: d.food_name.clone(),
            description: d.description.clone(),
            quantity: d.quantity,
            donation_type: d.donation_type.into(),
            status: d.status.into(),
            expires_at: d.expires_at.unix_timestamp(),
            pickup: PickupLocation {
                address: d.pickup_address.clone(),
                latitude: d.pickup_latitude,
                longitude: d.pickup_longitude,
            },
            photo_url: d.photo_url.clone(),
            created_at: d.created_at.unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDonation {
    pub donor_id: Uuid,
    pub food_name: CompactString,
    pub description: String,
    pub quantity: i32,
    pub donation_type: DonationType,
    pub expires_at: OffsetDateTime,
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub photo_url: Option<String>,
}

impl NewDonation {
    /// Build the stored record. The donation always starts `Available`.
    pub fn into_donation(self, donation_id: Uuid, now: OffsetDateTime) -> Donation {
        Donation {
            donation_id,
            donor_id: self.donor_id,
            food_name: self.food_name,
            description: self.description,
            quantity: self.quantity,
            donation_type: self.donation_type,
            status: DonationStatus::Available,
            expires_at: self.expires_at,
            pickup_address: self.pickup_address,
            pickup_latitude: self.pickup_latitude,
            pickup_longitude: self.pickup_longitude,
            photo_url: self.photo_url,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
/// Insert a fully built donation record.
pub struct InsertDonation {
    pub donation: Donation,
}

impl Processor<InsertDonation> for DatabaseProcessor {
    type Output = Donation;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertDonation")]
    async fn process(&self, insert: InsertDonation) -> Result<Donation, sqlx::Error> {
        let d = insert.donation;
        sqlx::query_as::<_, Donation>(
            r#"
            INSERT INTO donations (
                donation_id, donor_id, food_name, description, quantity, donation_type,
                status, expires_at, pickup_address, pickup_latitude, pickup_longitude,
                photo_url, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(d.donation_id)
        .bind(d.donor_id)
        .bind(d.food_name)
        .bind(d.description)
        .bind(d.quantity)
        .bind(d.donation_type)
        .bind(d.status)
        .bind(d.expires_at)
        .bind(d.pickup_address)
        .bind(d.pickup_latitude)
        .bind(d.pickup_longitude)
        .bind(d.photo_url)
        .bind(d.created_at)
        .bind(d.updated_at)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetDonationById {
    pub donation_id: Uuid,
}

impl Processor<GetDonationById> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDonationById")]
    async fn process(&self, query: GetDonationById) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>("SELECT * FROM donations WHERE donation_id = $1")
            .bind(query.donation_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Claimable donations of one type, soonest expiry first.
pub struct ListAvailableDonations {
    pub donation_type: DonationType,
    pub now: OffsetDateTime,
}

impl Processor<ListAvailableDonations> for DatabaseProcessor {
    type Output = Vec<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListAvailableDonations")]
    async fn process(&self, query: ListAvailableDonations) -> Result<Vec<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            r#"
            SELECT * FROM donations
            WHERE status = 'AVAILABLE'
              AND donation_type = $1
              AND expires_at > $2
            ORDER BY expires_at ASC, donation_id ASC
            "#,
        )
        .bind(query.donation_type)
        .bind(query.now)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListDonationsByDonor {
    pub donor_id: Uuid,
}

impl Processor<ListDonationsByDonor> for DatabaseProcessor {
    type Output = Vec<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListDonationsByDonor")]
    async fn process(&self, query: ListDonationsByDonor) -> Result<Vec<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            "SELECT * FROM donations WHERE donor_id = $1 ORDER BY created_at DESC",
        )
        .bind(query.donor_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Donations the sweeper has to look at: `Available` or `Requested` and past expiry.
pub struct ListSweepCandidates {
    pub now: OffsetDateTime,
}

impl Processor<ListSweepCandidates> for DatabaseProcessor {
    type Output = Vec<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListSweepCandidates")]
    async fn process(&self, query: ListSweepCandidates) -> Result<Vec<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            r#"
            SELECT * FROM donations
            WHERE status IN ('AVAILABLE', 'REQUESTED')
              AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(query.now)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Donations in `Requested` or `Assigned`.
pub struct ListClaimedDonations;

impl Processor<ListClaimedDonations> for DatabaseProcessor {
    type Output = Vec<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListClaimedDonations")]
    async fn process(&self, _: ListClaimedDonations) -> Result<Vec<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            "SELECT * FROM donations WHERE status IN ('REQUESTED', 'ASSIGNED')",
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Compare-and-set the status of a single donation.
///
/// Returns `None` when the row does not exist or its status is not `expected`.
pub struct CompareAndSetDonationStatus {
    pub donation_id: Uuid,
    pub expected: DonationStatus,
    pub new: DonationStatus,
    pub now: OffsetDateTime,
}

impl Processor<CompareAndSetDonationStatus> for DatabaseProcessor {
    type Output = Option<Donation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompareAndSetDonationStatus")]
    async fn process(
        &self,
        update: CompareAndSetDonationStatus,
    ) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            r#"
            UPDATE donations
            SET status = $3, updated_at = $4
            WHERE donation_id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(update.donation_id)
        .bind(update.expected)
        .bind(update.new)
        .bind(update.now)
        .fetch_optional(&self.pool)
        .await
    }
}

impl Donation {
    /// Lock-free claim step: `Available` → `Requested` if still unexpired.
    pub async fn claim_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        donation_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            r#"
            UPDATE donations
            SET status = 'REQUESTED', updated_at = $2
            WHERE donation_id = $1
              AND status = 'AVAILABLE'
              AND expires_at > $2
            RETURNING *
            "#,
        )
        .bind(donation_id)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Compare-and-set the donation status within a transaction.
    pub async fn compare_and_set_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        donation_id: Uuid,
        expected: DonationStatus,
        new: DonationStatus,
        now: OffsetDateTime,
    ) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>(
            r#"
            UPDATE donations
            SET status = $3, updated_at = $4
            WHERE donation_id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(donation_id)
        .bind(expected)
        .bind(new)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn get_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        donation_id: Uuid,
    ) -> Result<Option<Donation>, sqlx::Error> {
        sqlx::query_as::<_, Donation>("SELECT * FROM donations WHERE donation_id = $1")
            .bind(donation_id)
            .fetch_optional(&mut **tx)
            .await
    }
}
