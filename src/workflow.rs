//! Status transitions for applications and the orchestration that issues them.
//!
//! ## Locking
//!
//! A donation begins by re-reading the application straight from the API,
//! bypassing the query cache, and only then issuing the `Open -> Locked`
//! transition.  The fresh read is a last-write-wins check, not a transaction:
//! a second donor can still lock between the read and the lock request, and
//! the server is the final arbiter.  What the check buys is that a donor who
//! opens a stale listing is sent to the locked notice instead of firing a
//! doomed request.
//!
//! ## Re-entrancy
//!
//! Execution is single-tasked, but every network call is a suspension point,
//! so a second click can start an identical mutation while the first is still
//! outstanding.  [`InFlightGuard`] makes those duplicates no-ops.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::info;

use crate::api::{ApiClient, ApplicationSource};
use crate::errors::{ClientError, Result};
use crate::types::{Application, ApplicationStatus, StatusUpdate, UserRole};

// ─────────────────────────────────────────────────────────
// Guards (pure)
// ─────────────────────────────────────────────────────────

/// A donor may fund an application only while it is open.
pub fn can_donate(app: &Application) -> bool {
    app.status == ApplicationStatus::Open
}

/// Only the receiver who created an open application may delete it.
pub fn can_delete(app: &Application, role: UserRole, user_id: u64) -> bool {
    app.status == ApplicationStatus::Open
        && role == UserRole::Receiver
        && app.receiver_id == user_id
}

/// Receival can be confirmed only while funds are pending.
pub fn can_confirm(app: &Application) -> bool {
    app.status == ApplicationStatus::Pending
}

/// Only the owning producer may withdraw, and only while funds are outstanding.
pub fn can_withdraw(app: &Application, role: UserRole, user_id: u64) -> bool {
    role == UserRole::Producer && app.producer_id == user_id && app.has_outstanding_bytes()
}

/// What the fresh read before locking tells us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// Still open; issue the lock.
    Proceed,
    /// Another donor got there first; show the locked notice.
    AlreadyLocked,
    /// Withdrawn, completed or otherwise gone; show the unavailable notice.
    Unavailable,
}

pub fn lock_decision(fresh: &Application) -> LockDecision {
    match fresh.status {
        ApplicationStatus::Open => LockDecision::Proceed,
        ApplicationStatus::Locked => LockDecision::AlreadyLocked,
        ApplicationStatus::Pending
        | ApplicationStatus::Completed
        | ApplicationStatus::Withdrawn
        | ApplicationStatus::Unavailable => LockDecision::Unavailable,
    }
}

// ─────────────────────────────────────────────────────────
// Seams
// ─────────────────────────────────────────────────────────

/// Strategy for committing and releasing a donation.
///
/// The platform wallet is the one production implementation; an external
/// Obyte wallet would slot in here as a second one.
#[async_trait]
pub trait DonationBackend {
    /// Issue the `Open -> Locked` transition.
    async fn lock(&self, app: &Application) -> Result<Application>;

    /// Issue the `Locked -> Open` revert.
    async fn release(&self, app: &Application) -> Result<Application>;
}

/// Donation backend funded from the donor's PolloPollo account, going through
/// the platform API.
pub struct PolloPolloBackend<'a> {
    pub client: &'a ApiClient,
}

#[async_trait]
impl DonationBackend for PolloPolloBackend<'_> {
    async fn lock(&self, app: &Application) -> Result<Application> {
        self.client
            .update_status(&StatusUpdate {
                application_id: app.application_id,
                status: ApplicationStatus::Locked,
            })
            .await
    }

    async fn release(&self, app: &Application) -> Result<Application> {
        self.client
            .update_status(&StatusUpdate {
                application_id: app.application_id,
                status: ApplicationStatus::Open,
            })
            .await
    }
}

/// The mutating endpoints the workflow drives besides the donation lock.
#[async_trait]
pub trait MutationApi {
    async fn confirm_receival(&self, receiver_id: u64, application_id: u64) -> Result<()>;
    async fn withdraw_bytes(&self, producer_id: u64, application_id: u64) -> Result<()>;
    async fn delete_application(&self, user_id: u64, application_id: u64) -> Result<()>;
}

#[async_trait]
impl MutationApi for ApiClient {
    async fn confirm_receival(&self, receiver_id: u64, application_id: u64) -> Result<()> {
        ApiClient::confirm_receival(self, receiver_id, application_id).await
    }

    async fn withdraw_bytes(&self, producer_id: u64, application_id: u64) -> Result<()> {
        ApiClient::withdraw_bytes(self, producer_id, application_id).await
    }

    async fn delete_application(&self, user_id: u64, application_id: u64) -> Result<()> {
        ApiClient::delete_application(self, user_id, application_id).await
    }
}

// ─────────────────────────────────────────────────────────
// In-flight guard
// ─────────────────────────────────────────────────────────

/// Mutations an application can have outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Lock,
    Confirm,
    Withdraw,
    Delete,
}

/// Tracks which `(operation, application)` pairs are currently awaiting a
/// server response.  Single-tasked execution, so a plain set suffices.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    outstanding: HashSet<(Operation, u64)>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operation as outstanding.  Returns `false` if an identical one
    /// already is, in which case the caller must not submit.
    pub fn try_begin(&mut self, op: Operation, application_id: u64) -> bool {
        self.outstanding.insert((op, application_id))
    }

    pub fn finish(&mut self, op: Operation, application_id: u64) {
        self.outstanding.remove(&(op, application_id));
    }

    pub fn is_in_flight(&self, op: Operation, application_id: u64) -> bool {
        self.outstanding.contains(&(op, application_id))
    }
}

// ─────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────

/// Result of starting the donation flow.
#[derive(Debug, Clone, PartialEq)]
pub enum DonationOutcome {
    /// The application is now locked for this donor; proceed to payment.
    Locked(Application),
    /// Another donor locked it first.
    AlreadyLocked,
    /// The application left the open state entirely.
    Unavailable,
}

/// Result of a guarded mutation (confirm / withdraw).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// An identical submission is still awaiting its response; nothing was sent.
    AlreadyInFlight,
}

/// Start the donation flow for `app`.
///
/// Re-fetches the application by id — never from cache — and decides from the
/// fresh status.  The lock request is only sent on [`LockDecision::Proceed`].
pub async fn begin_donation<S, B>(
    source: &S,
    backend: &B,
    app: &Application,
) -> Result<DonationOutcome>
where
    S: ApplicationSource + Sync,
    B: DonationBackend + Sync,
{
    let fresh = source.fetch_by_id(app.application_id).await?;
    match lock_decision(&fresh) {
        LockDecision::Proceed => {
            let locked = backend.lock(&fresh).await?;
            info!("Application {} locked for donation", app.application_id);
            Ok(DonationOutcome::Locked(locked))
        }
        LockDecision::AlreadyLocked => {
            info!(
                "Application {} was locked by another donor",
                app.application_id
            );
            Ok(DonationOutcome::AlreadyLocked)
        }
        LockDecision::Unavailable => Ok(DonationOutcome::Unavailable),
    }
}

/// Revert a lock this donor holds back to open; used when the donation dialog
/// is closed without completing payment.
pub async fn cancel_donation<B>(backend: &B, app: &Application) -> Result<Application>
where
    B: DonationBackend + Sync,
{
    if app.status != ApplicationStatus::Locked {
        return Err(ClientError::IllegalTransition {
            from: app.status,
            to: ApplicationStatus::Open,
        });
    }
    backend.release(app).await
}

/// Confirm that the receiver got the product; `Pending -> Completed`.
pub async fn confirm_receival<A>(
    api: &A,
    guard: &mut InFlightGuard,
    app: &Application,
) -> Result<MutationOutcome>
where
    A: MutationApi + Sync,
{
    if !can_confirm(app) {
        return Err(ClientError::IllegalTransition {
            from: app.status,
            to: ApplicationStatus::Completed,
        });
    }
    if !guard.try_begin(Operation::Confirm, app.application_id) {
        return Ok(MutationOutcome::AlreadyInFlight);
    }
    let result = api
        .confirm_receival(app.receiver_id, app.application_id)
        .await;
    guard.finish(Operation::Confirm, app.application_id);
    result.map(|()| MutationOutcome::Applied)
}

/// Withdraw outstanding funds to the producer, moving toward `Withdrawn`.
pub async fn withdraw_bytes<A>(
    api: &A,
    guard: &mut InFlightGuard,
    app: &Application,
    role: UserRole,
    user_id: u64,
) -> Result<MutationOutcome>
where
    A: MutationApi + Sync,
{
    if !can_withdraw(app, role, user_id) {
        return Err(ClientError::IllegalTransition {
            from: app.status,
            to: ApplicationStatus::Withdrawn,
        });
    }
    if !guard.try_begin(Operation::Withdraw, app.application_id) {
        return Ok(MutationOutcome::AlreadyInFlight);
    }
    let result = api
        .withdraw_bytes(app.producer_id, app.application_id)
        .await;
    guard.finish(Operation::Withdraw, app.application_id);
    result.map(|()| MutationOutcome::Applied)
}

/// Delete an open application the caller owns.  On `Ok` the caller removes it
/// from whatever list is showing it; nothing is removed before the server
/// confirms.
pub async fn delete_application<A>(
    api: &A,
    app: &Application,
    role: UserRole,
    user_id: u64,
) -> Result<()>
where
    A: MutationApi + Sync,
{
    if !can_delete(app, role, user_id) {
        return Err(ClientError::IllegalTransition {
            from: app.status,
            to: ApplicationStatus::Unavailable,
        });
    }
    api.delete_application(user_id, app.application_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PageQuery;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn app(status: ApplicationStatus) -> Application {
        Application {
            application_id: 42,
            status,
            product_id: 10,
            product_title: "Solar lamp".to_string(),
            product_price: 15,
            receiver_id: 7,
            producer_id: 3,
            motivation: "Light for studying".to_string(),
            bytes: 30_000,
            contract_shared_address: None,
            creation_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            date_of_donation: None,
        }
    }

    /// Source whose fresh read always reports `fresh_status`.
    struct FixedSource {
        fresh_status: ApplicationStatus,
        reads: AtomicUsize,
    }

    impl FixedSource {
        fn new(fresh_status: ApplicationStatus) -> Self {
            Self {
                fresh_status,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ApplicationSource for FixedSource {
        async fn fetch_page(&self, _query: &PageQuery) -> Result<(Vec<Application>, u64)> {
            Ok((vec![], 0))
        }

        async fn fetch_by_id(&self, _id: u64) -> Result<Application> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(app(self.fresh_status))
        }

        async fn fetch_countries(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn fetch_cities(&self, _country: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        locks: AtomicUsize,
        releases: AtomicUsize,
    }

    #[async_trait]
    impl DonationBackend for RecordingBackend {
        async fn lock(&self, a: &Application) -> Result<Application> {
            self.locks.fetch_add(1, Ordering::SeqCst);
            let mut locked = a.clone();
            locked.status = ApplicationStatus::Locked;
            Ok(locked)
        }

        async fn release(&self, a: &Application) -> Result<Application> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            let mut open = a.clone();
            open.status = ApplicationStatus::Open;
            Ok(open)
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        confirms: AtomicUsize,
        withdraws: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl MutationApi for RecordingApi {
        async fn confirm_receival(&self, _receiver_id: u64, _id: u64) -> Result<()> {
            self.confirms.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn withdraw_bytes(&self, _producer_id: u64, _id: u64) -> Result<()> {
            self.withdraws.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_application(&self, _user_id: u64, _id: u64) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn can_donate_only_when_open() {
        use ApplicationStatus::*;
        assert!(can_donate(&app(Open)));
        for status in [Locked, Pending, Completed, Withdrawn, Unavailable] {
            assert!(!can_donate(&app(status)));
        }
    }

    #[test]
    fn delete_requires_open_and_owning_receiver() {
        let a = app(ApplicationStatus::Open);
        assert!(can_delete(&a, UserRole::Receiver, 7));
        assert!(!can_delete(&a, UserRole::Receiver, 8));
        assert!(!can_delete(&a, UserRole::Producer, 7));
        assert!(!can_delete(&a, UserRole::Donor, 7));
        assert!(!can_delete(&app(ApplicationStatus::Pending), UserRole::Receiver, 7));
    }

    #[test]
    fn withdraw_requires_owning_producer_with_outstanding_bytes() {
        let a = app(ApplicationStatus::Pending);
        assert!(can_withdraw(&a, UserRole::Producer, 3));
        assert!(!can_withdraw(&a, UserRole::Producer, 4));
        assert!(!can_withdraw(&a, UserRole::Receiver, 3));
        let mut drained = a.clone();
        drained.bytes = 0;
        assert!(!can_withdraw(&drained, UserRole::Producer, 3));
        // Terminal statuses never approve a withdraw, even with bytes left.
        let mut terminal = a;
        for status in [
            ApplicationStatus::Completed,
            ApplicationStatus::Withdrawn,
            ApplicationStatus::Unavailable,
        ] {
            terminal.status = status;
            assert!(!can_withdraw(&terminal, UserRole::Producer, 3));
        }
    }

    #[test]
    fn lock_decision_covers_every_status() {
        use ApplicationStatus::*;
        assert_eq!(lock_decision(&app(Open)), LockDecision::Proceed);
        assert_eq!(lock_decision(&app(Locked)), LockDecision::AlreadyLocked);
        for status in [Pending, Completed, Withdrawn, Unavailable] {
            assert_eq!(lock_decision(&app(status)), LockDecision::Unavailable);
        }
    }

    #[tokio::test]
    async fn begin_donation_reads_fresh_before_locking() {
        let source = FixedSource::new(ApplicationStatus::Open);
        let backend = RecordingBackend::default();

        let outcome = begin_donation(&source, &backend, &app(ApplicationStatus::Open))
            .await
            .unwrap();

        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.locks.load(Ordering::SeqCst), 1);
        match outcome {
            DonationOutcome::Locked(a) => assert_eq!(a.status, ApplicationStatus::Locked),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn begin_donation_takes_locked_notice_path_without_lock_request() {
        // The cached copy says open, but the fresh read shows another donor won.
        let source = FixedSource::new(ApplicationStatus::Locked);
        let backend = RecordingBackend::default();

        let outcome = begin_donation(&source, &backend, &app(ApplicationStatus::Open))
            .await
            .unwrap();

        assert_eq!(outcome, DonationOutcome::AlreadyLocked);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.locks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn begin_donation_on_withdrawn_application_is_unavailable() {
        let source = FixedSource::new(ApplicationStatus::Withdrawn);
        let backend = RecordingBackend::default();

        let outcome = begin_donation(&source, &backend, &app(ApplicationStatus::Open))
            .await
            .unwrap();

        assert_eq!(outcome, DonationOutcome::Unavailable);
        assert_eq!(backend.locks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_donation_releases_a_held_lock() {
        let backend = RecordingBackend::default();
        let released = cancel_donation(&backend, &app(ApplicationStatus::Locked))
            .await
            .unwrap();
        assert_eq!(released.status, ApplicationStatus::Open);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_donation_rejects_non_locked_application() {
        let backend = RecordingBackend::default();
        let err = cancel_donation(&backend, &app(ApplicationStatus::Open))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::IllegalTransition { .. }));
        assert_eq!(backend.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confirm_receival_is_guarded_against_duplicates() {
        let api = RecordingApi::default();
        let mut guard = InFlightGuard::new();
        let a = app(ApplicationStatus::Pending);

        // Simulate the first submission still being outstanding.
        assert!(guard.try_begin(Operation::Confirm, a.application_id));
        let outcome = confirm_receival(&api, &mut guard, &a).await.unwrap();
        assert_eq!(outcome, MutationOutcome::AlreadyInFlight);
        assert_eq!(api.confirms.load(Ordering::SeqCst), 0);

        // Once the first finishes, the next submission goes through.
        guard.finish(Operation::Confirm, a.application_id);
        let outcome = confirm_receival(&api, &mut guard, &a).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Applied);
        assert_eq!(api.confirms.load(Ordering::SeqCst), 1);
        assert!(!guard.is_in_flight(Operation::Confirm, a.application_id));
    }

    #[tokio::test]
    async fn confirm_receival_rejects_non_pending() {
        let api = RecordingApi::default();
        let mut guard = InFlightGuard::new();
        let err = confirm_receival(&api, &mut guard, &app(ApplicationStatus::Open))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::IllegalTransition { .. }));
        assert_eq!(api.confirms.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn withdraw_is_guarded_and_role_checked() {
        let api = RecordingApi::default();
        let mut guard = InFlightGuard::new();
        let a = app(ApplicationStatus::Pending);

        let outcome = withdraw_bytes(&api, &mut guard, &a, UserRole::Producer, 3)
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Applied);
        assert_eq!(api.withdraws.load(Ordering::SeqCst), 1);

        let err = withdraw_bytes(&api, &mut guard, &a, UserRole::Donor, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::IllegalTransition { .. }));
        assert_eq!(api.withdraws.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_goes_through_only_for_the_owner() {
        let api = RecordingApi::default();
        let a = app(ApplicationStatus::Open);

        delete_application(&api, &a, UserRole::Receiver, 7)
            .await
            .unwrap();
        assert_eq!(api.deletes.load(Ordering::SeqCst), 1);

        let err = delete_application(&api, &a, UserRole::Receiver, 99)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::IllegalTransition { .. }));
        assert_eq!(api.deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_tracks_operations_independently() {
        let mut guard = InFlightGuard::new();
        assert!(guard.try_begin(Operation::Confirm, 1));
        assert!(guard.try_begin(Operation::Withdraw, 1));
        assert!(!guard.try_begin(Operation::Confirm, 1));
        assert!(guard.try_begin(Operation::Confirm, 2));
        guard.finish(Operation::Confirm, 1);
        assert!(guard.try_begin(Operation::Confirm, 1));
    }
}
