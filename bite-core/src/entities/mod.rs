pub mod donation;
pub mod request;
pub mod tracking;

pub use donation::{
    CompareAndSetDonationStatus, Donation, GetDonationById, InsertDonation,
    ListAvailableDonations, ListClaimedDonations, ListDonationsByDonor, ListSweepCandidates,
    NewDonation,
};
pub use request::{
    GetRequestById, ListLiveRequests, ListOpenRequests, ListRequests, NewRequest, Request,
    RequestFilter,
};
pub use tracking::TrackingSample;

use bite_sdk::objects::{
    DonationStatus as SdkDonationStatus, DonationType as SdkDonationType,
    RequestStatus as SdkRequestStatus, RequesterType as SdkRequesterType,
};

/// Donation type for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `bite_sdk::objects::DonationType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "donation_type")]
pub enum DonationType {
    Human,
    Dog,
    Compost,
}

impl From<DonationType> for SdkDonationType {
    fn from(value: DonationType) -> Self {
        match value {
            DonationType::Human => SdkDonationType::Human,
            DonationType::Dog => SdkDonationType::Dog,
            DonationType::Compost => SdkDonationType::Compost,
        }
    }
}

impl From<SdkDonationType> for DonationType {
    fn from(value: SdkDonationType) -> Self {
        match value {
            SdkDonationType::Human => DonationType::Human,
            SdkDonationType::Dog => DonationType::Dog,
            SdkDonationType::Compost => DonationType::Compost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "donation_status")]
pub enum DonationStatus {
    Available,
    Requested,
    Assigned,
    Delivered,
    Composted,
    Expired,
    Rejected,
}

impl DonationStatus {
    /// No transition leaves these states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DonationStatus::Delivered
                | DonationStatus::Composted
                | DonationStatus::Expired
                | DonationStatus::Rejected
        )
    }

    /// Someone holds (or held) a request on the donation.
    pub fn is_claimed(self) -> bool {
        matches!(
            self,
            DonationStatus::Requested
                | DonationStatus::Assigned
                | DonationStatus::Delivered
                | DonationStatus::Composted
        )
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl From<DonationStatus> for SdkDonationStatus {
    fn from(value: DonationStatus) -> Self {
        match value {
            DonationStatus::Available => SdkDonationStatus::Available,
            DonationStatus::Requested => SdkDonationStatus::Requested,
            DonationStatus::Assigned => SdkDonationStatus::Assigned,
            DonationStatus::Delivered => SdkDonationStatus::Delivered,
            DonationStatus::Composted => SdkDonationStatus::Composted,
            DonationStatus::Expired => SdkDonationStatus::Expired,
            DonationStatus::Rejected => SdkDonationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "requester_type")]
pub enum RequesterType {
    Ngo,
    Volunteer,
    Needy,
    CompostAgency,
}

impl From<RequesterType> for SdkRequesterType {
    fn from(value: RequesterType) -> Self {
        match value {
            RequesterType::Ngo => SdkRequesterType::Ngo,
            RequesterType::Volunteer => SdkRequesterType::Volunteer,
            RequesterType::Needy => SdkRequesterType::Needy,
            RequesterType::CompostAgency => SdkRequesterType::CompostAgency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "request_status")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Delivered,
    Composted,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Delivered | RequestStatus::Composted | RequestStatus::Rejected
        )
    }

    /// Statuses in which the request must carry an assigned volunteer.
    pub fn requires_volunteer(self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted | RequestStatus::Delivered | RequestStatus::Composted
        )
    }

    /// The status the linked donation must be in while the request is in `self`.
    pub fn mirrored_donation_status(self) -> DonationStatus {
        match self {
            RequestStatus::Pending => DonationStatus::Requested,
            RequestStatus::Accepted => DonationStatus::Assigned,
            RequestStatus::Delivered => DonationStatus::Delivered,
            RequestStatus::Composted => DonationStatus::Composted,
            RequestStatus::Rejected => DonationStatus::Available,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl From<RequestStatus> for SdkRequestStatus {
    fn from(value: RequestStatus) -> Self {
        match value {
            RequestStatus::Pending => SdkRequestStatus::Pending,
            RequestStatus::Accepted => SdkRequestStatus::Accepted,
            RequestStatus::Delivered => SdkRequestStatus::Delivered,
            RequestStatus::Composted => SdkRequestStatus::Composted,
            RequestStatus::Rejected => SdkRequestStatus::Rejected,
        }
    }
}

impl From<SdkRequestStatus> for RequestStatus {
    fn from(value: SdkRequestStatus) -> Self {
        match value {
            SdkRequestStatus::Pending => RequestStatus::Pending,
            SdkRequestStatus::Accepted => RequestStatus::Accepted,
            SdkRequestStatus::Delivered => RequestStatus::Delivered,
            SdkRequestStatus::Composted => RequestStatus::Composted,
            SdkRequestStatus::Rejected => RequestStatus::Rejected,
        }
    }
}
