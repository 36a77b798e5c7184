use super::{RequestStatus, RequesterType};
use crate::framework::DatabaseProcessor;
use bite_sdk::objects::RequestResponse;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Request {
    pub request_id: Uuid,
    pub donation_id: Uuid,
    pub requester_id: Uuid,
    pub requester_type: RequesterType,
    pub assigned_volunteer: Option<Uuid>,
    pub status: RequestStatus,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<&Request> for RequestResponse {
    fn from(r: &Request) -> Self {
        RequestResponse {
            request_id: r.request_id,
            donation_id: r.donation_id,
            requester_id: r.requester_id,
            requester_type: r.requester_type.into(),
            assigned_volunteer: r.assigned_volunteer,
            status: r.status.into(),
            pickup_address: r.pickup_address.clone(),
            delivery_address: r.delivery_address.clone(),
            created_at: r.created_at.unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub donation_id: Uuid,
    pub requester_id: Uuid,
    pub requester_type: RequesterType,
    pub delivery_address: Option<String>,
}

impl NewRequest {
    /// Build the stored record. Requests always start `Pending` and unassigned.
    pub fn into_request(
        self,
        request_id: Uuid,
        pickup_address: Option<String>,
        now: OffsetDateTime,
    ) -> Request {
        Request {
            request_id,
            donation_id: self.donation_id,
            requester_id: self.requester_id,
            requester_type: self.requester_type,
            assigned_volunteer: None,
            status: RequestStatus::Pending,
            pickup_address,
            delivery_address: self.delivery_address,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GetRequestById {
    pub request_id: Uuid,
}

impl Processor<GetRequestById> for DatabaseProcessor {
    type Output = Option<Request>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRequestById")]
    async fn process(&self, query: GetRequestById) -> Result<Option<Request>, sqlx::Error> {
        sqlx::query_as::<_, Request>("SELECT * FROM requests WHERE request_id = $1")
            .bind(query.request_id)
            .fetch_optional(&self.pool)
            .await
    }
}

/// Which column a request listing filters on.
#[derive(Debug, Clone, Copy)]
pub enum RequestFilter {
    Requester(Uuid),
    Volunteer(Uuid),
    Donation(Uuid),
}

#[derive(Debug, Clone)]
pub struct ListRequests {
    pub filter: RequestFilter,
}

impl Processor<ListRequests> for DatabaseProcessor {
    type Output = Vec<Request>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRequests")]
    async fn process(&self, query: ListRequests) -> Result<Vec<Request>, sqlx::Error> {
        let (sql, id) = match query.filter {
            RequestFilter::Requester(id) => (
                "SELECT * FROM requests WHERE requester_id = $1 ORDER BY created_at DESC",
                id,
            ),
            RequestFilter::Volunteer(id) => (
                "SELECT * FROM requests WHERE assigned_volunteer = $1 ORDER BY created_at DESC",
                id,
            ),
            RequestFilter::Donation(id) => (
                "SELECT * FROM requests WHERE donation_id = $1 ORDER BY created_at DESC",
                id,
            ),
        };
        sqlx::query_as::<_, Request>(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Requests in `Pending`, oldest first, for volunteers looking for work.
pub struct ListOpenRequests;

impl Processor<ListOpenRequests> for DatabaseProcessor {
    type Output = Vec<Request>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOpenRequests")]
    async fn process(&self, _: ListOpenRequests) -> Result<Vec<Request>, sqlx::Error> {
        sqlx::query_as::<_, Request>(
            "SELECT * FROM requests WHERE status = 'PENDING' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Requests in `Pending` or `Accepted`.
pub struct ListLiveRequests;

impl Processor<ListLiveRequests> for DatabaseProcessor {
    type Output = Vec<Request>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListLiveRequests")]
    async fn process(&self, _: ListLiveRequests) -> Result<Vec<Request>, sqlx::Error> {
        sqlx::query_as::<_, Request>(
            "SELECT * FROM requests WHERE status IN ('PENDING', 'ACCEPTED')",
        )
        .fetch_all(&self.pool)
        .await
    }
}

impl Request {
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request: Request,
    ) -> Result<Request, sqlx::Error> {
        sqlx::query_as::<_, Request>(
            r#"
            INSERT INTO requests (
                request_id, donation_id, requester_id, requester_type, assigned_volunteer,
                status, pickup_address, delivery_address, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.request_id)
        .bind(request.donation_id)
        .bind(request.requester_id)
        .bind(request.requester_type)
        .bind(request.assigned_volunteer)
        .bind(request.status)
        .bind(request.pickup_address)
        .bind(request.delivery_address)
        .bind(request.created_at)
        .bind(request.updated_at)
        .fetch_one(&mut **tx)
        .await
    }

    /// Compare-and-set the request status within a transaction.
    ///
    /// With `assign` set, the row must also have no volunteer yet and the
    /// volunteer is written in the same statement.
    pub async fn compare_and_set_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request_id: Uuid,
        expected: RequestStatus,
        new: RequestStatus,
        assign: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Request>, sqlx::Error> {
        sqlx::query_as::<_, Request>(
            r#"
            UPDATE requests
            SET status = $3,
                assigned_volunteer = COALESCE($4::uuid, assigned_volunteer),
                updated_at = $5
            WHERE request_id = $1
              AND status = $2
              AND ($4::uuid IS NULL OR assigned_volunteer IS NULL)
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(expected)
        .bind(new)
        .bind(assign)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn get_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request_id: Uuid,
    ) -> Result<Option<Request>, sqlx::Error> {
        sqlx::query_as::<_, Request>("SELECT * FROM requests WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(&mut **tx)
            .await
    }
}
