//! Domain model shared across all modules of the client.
//!
//! ## Status as a Finite-State Machine
//!
//! [`ApplicationStatus`] enforces the application lifecycle:
//!
//! ```text
//! Open ──► Locked ──► Pending ──► Completed
//!   │         │          │
//!   └─────────┴──────────┴──► Withdrawn | Unavailable
//! Locked ──► Open          (donor abandoned the donation dialog)
//! ```
//!
//! `Completed`, `Withdrawn` and `Unavailable` are absorbing; no transition
//! leaves them.  `Locked` is transient: it exists to prevent two donors from
//! funding the same application concurrently and is reverted to `Open` when
//! the donation flow is abandoned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    /// Visible to donors; accepting a donation.
    Open,
    /// A donor has begun the donation flow; no second donor may commit.
    Locked,
    /// Funds are committed; awaiting the receiver's confirmation of receival.
    Pending,
    /// Receival confirmed; funds released to the producer.
    Completed,
    /// The receiver or producer withdrew before completion.
    Withdrawn,
    /// The underlying product is no longer offered.
    Unavailable,
}

impl ApplicationStatus {
    /// Parse the status string used on the wire.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "LOCKED" => Some(Self::Locked),
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "WITHDRAWN" => Some(Self::Withdrawn),
            "UNAVAILABLE" => Some(Self::Unavailable),
            _ => None,
        }
    }

    /// Short identifier string, matching the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Locked => "LOCKED",
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Withdrawn => "WITHDRAWN",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    /// True for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Withdrawn | Self::Unavailable)
    }

    /// Transition legality map.  Exhaustive on purpose: adding a status
    /// variant without deciding its transitions must not compile.
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Open, Self::Locked)
            | (Self::Open, Self::Withdrawn)
            | (Self::Open, Self::Unavailable)
            | (Self::Locked, Self::Open)
            | (Self::Locked, Self::Pending)
            | (Self::Locked, Self::Withdrawn)
            | (Self::Locked, Self::Unavailable)
            | (Self::Pending, Self::Completed)
            | (Self::Pending, Self::Withdrawn)
            | (Self::Pending, Self::Unavailable) => true,
            (Self::Open, _)
            | (Self::Locked, _)
            | (Self::Pending, _)
            | (Self::Completed, _)
            | (Self::Withdrawn, _)
            | (Self::Unavailable, _) => false,
        }
    }
}

/// Role of the authenticated user.  Always exactly one variant; there is no
/// "undefined" role on this side of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Offers products.
    Producer,
    /// Applies for products.
    Receiver,
    /// Funds accepted applications.
    Donor,
}

/// A receiver's request for a specific product, tracked through the status
/// lifecycle above.  Server-assigned identity; never constructed client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: u64,
    pub status: ApplicationStatus,
    pub product_id: u64,
    pub product_title: String,
    /// Price of the product in dollars.
    pub product_price: i64,
    pub receiver_id: u64,
    pub producer_id: u64,
    pub motivation: String,
    /// Funding amount in the blockchain-native unit.
    pub bytes: i64,
    /// Address of the shared contract once funds are committed.
    pub contract_shared_address: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub date_of_donation: Option<DateTime<Utc>>,
}

impl Application {
    /// Outstanding funds the producer could still withdraw.  Nothing is
    /// outstanding once the application reaches a terminal status: completed
    /// funds were released, withdrawn and unavailable ones already settled.
    pub fn has_outstanding_bytes(&self) -> bool {
        self.bytes > 0 && !self.status.is_terminal()
    }
}

/// A producer's offer.  Its application collections are derived views over
/// whatever applications are currently loaded, never persisted client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: u64,
    pub producer_id: u64,
    pub title: String,
    pub price: i64,
    pub country: String,
    pub city: String,
    pub available: bool,
}

impl Product {
    pub fn open_applications<'a>(&self, apps: &'a [Application]) -> Vec<&'a Application> {
        self.applications_with(apps, ApplicationStatus::Open)
    }

    pub fn pending_applications<'a>(&self, apps: &'a [Application]) -> Vec<&'a Application> {
        self.applications_with(apps, ApplicationStatus::Pending)
    }

    pub fn completed_applications<'a>(&self, apps: &'a [Application]) -> Vec<&'a Application> {
        self.applications_with(apps, ApplicationStatus::Completed)
    }

    fn applications_with<'a>(
        &self,
        apps: &'a [Application],
        status: ApplicationStatus,
    ) -> Vec<&'a Application> {
        apps.iter()
            .filter(|a| a.product_id == self.product_id && a.status == status)
            .collect()
    }
}

/// Body of the `PUT /applications` status transition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub application_id: u64,
    pub status: ApplicationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn app(status: ApplicationStatus) -> Application {
        Application {
            application_id: 1,
            status,
            product_id: 10,
            product_title: "Chicken feed".to_string(),
            product_price: 25,
            receiver_id: 7,
            producer_id: 3,
            motivation: "Feed for the farm".to_string(),
            bytes: 50_000,
            contract_shared_address: None,
            creation_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            date_of_donation: None,
        }
    }

    #[test]
    fn status_wire_round_trip() {
        for status in [
            ApplicationStatus::Open,
            ApplicationStatus::Locked,
            ApplicationStatus::Pending,
            ApplicationStatus::Completed,
            ApplicationStatus::Withdrawn,
            ApplicationStatus::Unavailable,
        ] {
            assert_eq!(ApplicationStatus::from_wire(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let back: ApplicationStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
        assert_eq!(ApplicationStatus::from_wire("DONATED"), None);
    }

    #[test]
    fn forward_transitions_are_legal() {
        use ApplicationStatus::*;
        assert!(Open.can_transition_to(Locked));
        assert!(Locked.can_transition_to(Open));
        assert!(Locked.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Completed));
        for from in [Open, Locked, Pending] {
            assert!(from.can_transition_to(Withdrawn));
            assert!(from.can_transition_to(Unavailable));
        }
    }

    #[test]
    fn terminal_states_are_absorbing() {
        use ApplicationStatus::*;
        for from in [Completed, Withdrawn, Unavailable] {
            assert!(from.is_terminal());
            for to in [Open, Locked, Pending, Completed, Withdrawn, Unavailable] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn no_backward_transitions() {
        use ApplicationStatus::*;
        assert!(!Pending.can_transition_to(Open));
        assert!(!Pending.can_transition_to(Locked));
        assert!(!Open.can_transition_to(Pending));
        assert!(!Open.can_transition_to(Completed));
        assert!(!Locked.can_transition_to(Completed));
    }

    #[test]
    fn application_json_uses_camel_case() {
        let a = app(ApplicationStatus::Open);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["applicationId"], 1);
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["productTitle"], "Chicken feed");
        assert!(json["contractSharedAddress"].is_null());
    }

    #[test]
    fn outstanding_bytes() {
        let mut a = app(ApplicationStatus::Pending);
        assert!(a.has_outstanding_bytes());
        // No terminal status leaves anything to withdraw, bytes or not.
        for status in [
            ApplicationStatus::Completed,
            ApplicationStatus::Withdrawn,
            ApplicationStatus::Unavailable,
        ] {
            a.status = status;
            assert!(!a.has_outstanding_bytes());
        }
        a.status = ApplicationStatus::Pending;
        a.bytes = 0;
        assert!(!a.has_outstanding_bytes());
    }

    #[test]
    fn product_application_views() {
        let product = Product {
            product_id: 10,
            producer_id: 3,
            title: "Chicken feed".to_string(),
            price: 25,
            country: "Denmark".to_string(),
            city: "Copenhagen".to_string(),
            available: true,
        };
        let mut open = app(ApplicationStatus::Open);
        open.application_id = 1;
        let mut pending = app(ApplicationStatus::Pending);
        pending.application_id = 2;
        let mut other_product = app(ApplicationStatus::Open);
        other_product.application_id = 3;
        other_product.product_id = 99;

        let apps = vec![open, pending, other_product];
        assert_eq!(product.open_applications(&apps).len(), 1);
        assert_eq!(product.open_applications(&apps)[0].application_id, 1);
        assert_eq!(product.pending_applications(&apps).len(), 1);
        assert!(product.completed_applications(&apps).is_empty());
    }
}
