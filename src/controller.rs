//! Submission controller
//!
//! One controller per bid card. It runs a bid attempt through validation,
//! encoding, the settlement call and lifecycle tracking, and owns the card's
//! [`Submission`] state:
//!
//! ```text
//! Idle ──submit──▶ Pending ──included──▶ Confirming ──confirmed──▶ Confirmed
//!                     │                      │
//!                     └──── rejected / reverted / timeout ────▶ Failed
//! ```
//!
//! Every transition goes through [`Submission::advance`] under the card lock,
//! so observers see statuses strictly in order and each terminal status
//! produces exactly one notification. Notifiers run after the lock is
//! released and may read the card back.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::abi::{AbiError, CallSignature};
use crate::bond::ActiveBond;
use crate::encoder::{EncodedAmount, FixedPointEncoder};
use crate::errors::BidError;
use crate::metrics::{metrics, Timer};
use crate::notify::{Notification, Notifier};
use crate::observability::SubmissionId;
use crate::settlement::{ReceiptSource, SettlementService, TransactionRef};
use crate::structured_logging::BidLogger;
use crate::tracker::{LifecycleTracker, TrackerConfig, TrackerPhase};
use crate::validator::{validate, ValidatedAmount};
use crate::wallet::WalletSession;

/// Status of a bid attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubmissionStatus {
    Idle,
    Pending,
    Confirming,
    Confirmed,
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to an in-flight submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionEvent {
    /// The settlement call was issued
    Submitted,
    /// The settlement service returned a transaction reference
    Accepted(TransactionRef),
    /// The transaction was included in a block
    Included { block_number: u64 },
    Confirmed { block_number: u64 },
    Failed(BidError),
}

impl SubmissionEvent {
    /// Lifecycle event for a tracker phase; `Pending` carries no news
    pub fn from_phase(phase: TrackerPhase) -> Option<Self> {
        match phase {
            TrackerPhase::Pending => None,
            TrackerPhase::Confirming { block_number } => Some(Self::Included { block_number }),
            TrackerPhase::Confirmed { block_number } => Some(Self::Confirmed { block_number }),
            TrackerPhase::Failed(error) => Some(Self::Failed(error)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Accepted(_) => "accepted",
            Self::Included { .. } => "included",
            Self::Confirmed { .. } => "confirmed",
            Self::Failed(_) => "failed",
        }
    }
}

/// One bid attempt on a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: SubmissionId,
    pub bond_id: String,
    pub status: SubmissionStatus,
    /// Set once the settlement service accepts the call
    pub transaction_ref: Option<TransactionRef>,
    /// Inclusion block, once known
    pub block_number: Option<u64>,
    /// Present only when `status` is `Failed`
    pub error: Option<BidError>,
    pub started_at: DateTime<Utc>,
    /// Every status entered, in order, starting with `Idle`
    pub transitions: Vec<SubmissionStatus>,
}

impl Submission {
    pub fn new(bond_id: impl Into<String>) -> Self {
        Self {
            id: SubmissionId::new(),
            bond_id: bond_id.into(),
            status: SubmissionStatus::Idle,
            transaction_ref: None,
            block_number: None,
            error: None,
            started_at: Utc::now(),
            transitions: vec![SubmissionStatus::Idle],
        }
    }

    /// Apply `event` if it moves this submission forward
    ///
    /// Returns false for stale, duplicate or backward events, which leave the
    /// submission untouched. `Confirmed` while still `Pending` passes through
    /// `Confirming` so the recorded sequence never skips it.
    pub fn advance(&mut self, event: SubmissionEvent) -> bool {
        use SubmissionStatus::*;

        match (self.status, event) {
            (Idle, SubmissionEvent::Submitted) => self.enter(Pending),
            (Pending, SubmissionEvent::Accepted(tx_ref)) if self.transaction_ref.is_none() => {
                self.transaction_ref = Some(tx_ref);
            }
            (Pending, SubmissionEvent::Included { block_number }) => {
                self.block_number = Some(block_number);
                self.enter(Confirming);
            }
            (Pending | Confirming, SubmissionEvent::Confirmed { block_number }) => {
                if self.status == Pending {
                    self.enter(Confirming);
                }
                self.block_number = Some(block_number);
                self.enter(Confirmed);
            }
            (Pending | Confirming, SubmissionEvent::Failed(error)) => {
                self.error = Some(error);
                self.enter(Failed);
            }
            _ => return false,
        }
        true
    }

    fn enter(&mut self, status: SubmissionStatus) {
        self.status = status;
        self.transitions.push(status);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Bound on waiting for the settlement service to accept the call
    pub acceptance_timeout: Duration,
    pub tracker: TrackerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            acceptance_timeout: Duration::from_secs(120),
            tracker: TrackerConfig::default(),
        }
    }
}

struct CardState {
    submission: Submission,
    input: String,
    /// Counted in the in-flight gauge; cleared on the outcome or on detach
    in_flight: bool,
}

impl CardState {
    /// True only for the caller that actually cleared the mark
    fn release_in_flight(&mut self) -> bool {
        std::mem::take(&mut self.in_flight)
    }
}

/// Per-attempt context shared by the driver task
#[derive(Clone)]
struct Attempt {
    id: SubmissionId,
    bond_id: String,
    min_bid: String,
    logger: BidLogger,
    timer: Timer,
}

/// State machine for one bid card
#[derive(Clone)]
pub struct SubmissionController {
    state: Arc<Mutex<CardState>>,
    updates: Arc<watch::Sender<Submission>>,
    settlement: Arc<dyn SettlementService>,
    tracker: LifecycleTracker,
    notifier: Arc<dyn Notifier>,
    encoder: FixedPointEncoder,
    /// Settlement call the arguments are checked against before submitting
    call: Option<CallSignature>,
    acceptance_timeout: Duration,
}

impl SubmissionController {
    pub fn new(
        settlement: Arc<dyn SettlementService>,
        receipts: Arc<dyn ReceiptSource>,
        notifier: Arc<dyn Notifier>,
        encoder: FixedPointEncoder,
        config: ControllerConfig,
    ) -> Self {
        let idle = Submission::new("");
        let (updates, _) = watch::channel(idle.clone());

        Self {
            state: Arc::new(Mutex::new(CardState {
                submission: idle,
                input: String::new(),
                in_flight: false,
            })),
            updates: Arc::new(updates),
            settlement,
            tracker: LifecycleTracker::new(receipts, config.tracker),
            notifier,
            encoder,
            call: None,
            acceptance_timeout: config.acceptance_timeout,
        }
    }

    /// Reject bids whose arguments do not fit `call` before any settlement call
    pub fn with_call(mut self, call: CallSignature) -> Self {
        self.call = Some(call);
        self
    }

    /// Start a bid attempt
    ///
    /// Local failures (wallet, amount, bond data, a submission already in
    /// flight) are returned here, notified, and leave the card untouched.
    /// Otherwise the card moves to `Pending` and the settlement call plus
    /// lifecycle tracking continue on a spawned task; this must be called
    /// from within a Tokio runtime.
    pub fn submit(
        &self,
        bond: &ActiveBond,
        raw_amount: &str,
        wallet: &dyn WalletSession,
    ) -> Result<SubmissionHandle, BidError> {
        let m = metrics();
        m.bids_attempted.inc();

        let logger = BidLogger::new(bond.id.clone());
        let mut state = self.state.lock();

        let prepared = if state.submission.status.is_terminal()
            || state.submission.status == SubmissionStatus::Idle
        {
            self.prepare(bond, raw_amount, wallet)
        } else {
            Err(BidError::SubmissionInProgress {
                bond_id: state.submission.bond_id.clone(),
            })
        };

        let (amount, bond_number, encoded) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                drop(state);
                logger.log_rejected(&error);
                m.bids_rejected_local
                    .with_label_values(&[error.category()])
                    .inc();
                self.notifier
                    .notify(error.notification(&bond.id, &bond.min_bid));
                return Err(error);
            }
        };

        let mut submission = Submission::new(bond.id.clone());
        submission.advance(SubmissionEvent::Submitted);

        let attempt = Attempt {
            id: submission.id.clone(),
            bond_id: bond.id.clone(),
            min_bid: bond.min_bid.clone(),
            logger,
            timer: Timer::new(),
        };

        attempt.logger.log_submitted(&attempt.id, &amount, encoded);
        attempt.logger.log_transition(
            &attempt.id,
            SubmissionStatus::Idle.as_str(),
            SubmissionStatus::Pending.as_str(),
        );

        state.submission = submission.clone();
        state.input = raw_amount.to_string();
        state.in_flight = true;
        self.updates.send_replace(submission);
        drop(state);

        m.submissions_in_flight.inc();

        let driver = self.clone();
        let task_attempt = attempt.clone();
        let task = tokio::spawn(async move {
            driver.drive(task_attempt, bond_number, encoded).await;
        });

        Ok(SubmissionHandle {
            id: attempt.id.clone(),
            rx: self.updates.subscribe(),
            task,
            attempt,
            controller: self.clone(),
        })
    }

    /// Submit whatever is currently typed into the card
    pub fn submit_input(
        &self,
        bond: &ActiveBond,
        wallet: &dyn WalletSession,
    ) -> Result<SubmissionHandle, BidError> {
        let raw = self.input();
        self.submit(bond, &raw, wallet)
    }

    fn prepare(
        &self,
        bond: &ActiveBond,
        raw_amount: &str,
        wallet: &dyn WalletSession,
    ) -> Result<(ValidatedAmount, u64, EncodedAmount), BidError> {
        let amount = validate(bond, raw_amount, wallet.is_connected())?;
        let bond_number = bond.settlement_id()?;
        let encoded = self.encoder.encode(&amount)?;

        if let Some(call) = &self.call {
            call.check_args(&[u128::from(bond_number), encoded.as_u128()])
                .map_err(|e| match e {
                    AbiError::ArgumentOverflow { index: 0, .. } => BidError::MalformedBond {
                        bond_id: bond.id.clone(),
                        reason: e.to_string(),
                    },
                    _ => BidError::AmountOverflow {
                        amount: amount.to_string(),
                        decimals: self.encoder.decimals(),
                    },
                })?;
        }
        Ok((amount, bond_number, encoded))
    }

    async fn drive(&self, attempt: Attempt, bond_number: u64, encoded: EncodedAmount) {
        let waited = self.acceptance_timeout;
        let placed = tokio::time::timeout(
            waited,
            self.settlement.place_encrypted_bid(bond_number, encoded),
        )
        .await;

        let tx_ref = match placed {
            Ok(Ok(tx_ref)) => tx_ref,
            Ok(Err(e)) => {
                let error = BidError::ExternalRejection(e.to_string());
                self.apply(&attempt, SubmissionEvent::Failed(error));
                return;
            }
            Err(_) => {
                self.apply(
                    &attempt,
                    SubmissionEvent::Failed(BidError::Timeout {
                        stage: "settlement acceptance",
                        waited,
                    }),
                );
                return;
            }
        };

        let m = metrics();
        m.bids_accepted.inc();
        attempt.timer.observe_duration(&m.acceptance_latency);
        attempt
            .logger
            .log_accepted(&attempt.id, &tx_ref, attempt.timer.elapsed_ms());
        self.apply(&attempt, SubmissionEvent::Accepted(tx_ref.clone()));

        self.tracker
            .observe(&tx_ref, |phase| {
                if let Some(event) = SubmissionEvent::from_phase(phase) {
                    self.apply(&attempt, event);
                }
            })
            .await;
    }

    /// Single atomic state update for the attempt's submission
    fn apply(&self, attempt: &Attempt, event: SubmissionEvent) -> bool {
        let mut state = self.state.lock();
        let before = state.submission.status;

        if state.submission.id != attempt.id || !state.submission.advance(event.clone()) {
            attempt
                .logger
                .log_ignored(&attempt.id, before.as_str(), event.name());
            return false;
        }

        let after = state.submission.status;
        let notice = if after != before {
            attempt
                .logger
                .log_transition(&attempt.id, before.as_str(), after.as_str());
            on_entered(&mut state, attempt, after)
        } else {
            None
        };

        self.updates.send_replace(state.submission.clone());
        drop(state);

        if let Some(notice) = notice {
            self.notifier.notify(notice);
        }
        true
    }

    /// Text currently typed into the card
    pub fn input(&self) -> String {
        self.state.lock().input.clone()
    }

    pub fn set_input(&self, raw: impl Into<String>) {
        self.state.lock().input = raw.into();
    }

    pub fn status(&self) -> SubmissionStatus {
        self.state.lock().submission.status
    }

    pub fn snapshot(&self) -> Submission {
        self.state.lock().submission.clone()
    }

    /// Every state change of this card, latest value first
    pub fn subscribe(&self) -> watch::Receiver<Submission> {
        self.updates.subscribe()
    }

    /// Return the card to `Idle`
    ///
    /// Allowed once the submission is terminal, or after its observation was
    /// stopped. Returns false while a tracked submission is still in flight.
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock();
        if state.in_flight {
            return false;
        }

        let idle = Submission::new(state.submission.bond_id.clone());
        state.submission = idle.clone();
        self.updates.send_replace(idle);
        true
    }
}

/// Bookkeeping for a newly entered status, run under the card lock
///
/// Returns the notification to deliver once the lock is released.
fn on_entered(
    state: &mut CardState,
    attempt: &Attempt,
    status: SubmissionStatus,
) -> Option<Notification> {
    let m = metrics();
    match status {
        SubmissionStatus::Confirmed => {
            state.input.clear();
            if state.release_in_flight() {
                m.submissions_in_flight.dec();
            }
            m.bids_confirmed.inc();
            attempt.timer.observe_duration(&m.confirmation_latency);
            attempt.logger.log_confirmed(
                &attempt.id,
                state.submission.transaction_ref.as_ref(),
                attempt.timer.elapsed_ms(),
            );
            Some(Notification::bid_confirmed(&attempt.bond_id))
        }
        SubmissionStatus::Failed => {
            if state.release_in_flight() {
                m.submissions_in_flight.dec();
            }
            let error = state.submission.error.as_ref()?;
            m.bids_failed.with_label_values(&[error.category()]).inc();
            attempt
                .logger
                .log_failed(&attempt.id, error, attempt.timer.elapsed_ms());
            Some(error.notification(&attempt.bond_id, &attempt.min_bid))
        }
        _ => None,
    }
}

/// Caller's view of one running attempt
pub struct SubmissionHandle {
    id: SubmissionId,
    rx: watch::Receiver<Submission>,
    task: JoinHandle<()>,
    attempt: Attempt,
    controller: SubmissionController,
}

impl SubmissionHandle {
    pub fn id(&self) -> &SubmissionId {
        &self.id
    }

    /// Latest state of the card
    pub fn snapshot(&self) -> Submission {
        self.rx.borrow().clone()
    }

    /// Wait until this attempt is terminal, or the card moved on
    pub async fn wait(&mut self) -> Submission {
        let id = self.id.clone();
        if let Ok(submission) = self
            .rx
            .wait_for(|s| s.id != id || s.status.is_terminal())
            .await
        {
            return submission.clone();
        }
        self.rx.borrow().clone()
    }

    /// Stop observing this attempt
    ///
    /// The settlement call and the transaction are left alone and may still
    /// succeed. The card stays in its current status and keeps refusing new
    /// submissions until [`SubmissionController::reset`].
    pub fn stop_tracking(self) -> Submission {
        let mut state = self.controller.state.lock();
        let submission = state.submission.clone();
        let detached = submission.id == self.id && state.release_in_flight();
        drop(state);

        self.task.abort();
        if !detached {
            return submission;
        }

        metrics().submissions_in_flight.dec();
        let tx_ref = submission.transaction_ref.as_ref();
        self.attempt.logger.log_detached(&self.id, tx_ref);
        self.controller.notifier.notify(Notification::observation_stopped(
            &self.attempt.bond_id,
            tx_ref.map_or("awaiting signature", TransactionRef::as_str),
        ));
        submission
    }
}
