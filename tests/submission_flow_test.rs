//! End-to-end bid submission flows against the in-memory settlement
//!
//! Covers the bid card scenarios: below-minimum bids, a confirmed bid,
//! a disconnected wallet, a double submit and independent cards.

use cipher_bond::bond::BondCatalog;
use cipher_bond::controller::{ControllerConfig, SubmissionController, SubmissionStatus};
use cipher_bond::encoder::{EncodedAmount, FixedPointEncoder};
use cipher_bond::errors::BidError;
use cipher_bond::mock::{MockReceipts, MockSettlement, ReceiptBehavior};
use cipher_bond::notify::{ChannelNotifier, Notification, Severity};
use cipher_bond::tracker::TrackerConfig;
use cipher_bond::validator::validate;
use cipher_bond::wallet::{self, WalletAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn address() -> WalletAddress {
    WalletAddress::parse("0x00000000000000000000000000000000000000aa").unwrap()
}

fn controller(
    settlement: &MockSettlement,
    receipts: &MockReceipts,
) -> (SubmissionController, UnboundedReceiver<Notification>) {
    let (notifier, notices) = ChannelNotifier::new();
    let controller = SubmissionController::new(
        Arc::new(settlement.clone()),
        Arc::new(receipts.clone()),
        Arc::new(notifier),
        FixedPointEncoder::default(),
        ControllerConfig {
            acceptance_timeout: Duration::from_secs(30),
            tracker: TrackerConfig {
                poll_interval: Duration::from_secs(1),
                confirmation_timeout: Duration::from_secs(120),
                required_confirmations: 2,
            },
        },
    );
    (controller, notices)
}

#[test]
fn test_below_minimum_scenario() {
    let catalog = BondCatalog::demo();
    let bond = catalog.get("1").unwrap();
    assert_eq!(bond.min_bid, "$100,000");

    let err = validate(bond, "99999", true).unwrap_err();
    assert!(matches!(err, BidError::BelowMinimum { .. }));
}

#[test]
fn test_only_active_bonds_are_biddable() {
    let catalog = BondCatalog::demo();
    let active: Vec<String> = catalog.active().map(|b| b.id.clone()).collect();
    assert_eq!(active, vec!["1".to_string(), "3".to_string()]);
    assert!(catalog.get("2").unwrap().biddable().is_none());
    assert!(catalog.get("4").unwrap().biddable().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_bid_scenario() {
    let settlement = MockSettlement::new();
    let receipts = MockReceipts::new(ReceiptBehavior::Succeed { after_polls: 3 });
    let (card, mut notices) = controller(&settlement, &receipts);
    let (connector, session) = wallet::session();
    connector.connect(address());

    let bond = BondCatalog::demo().get("1").unwrap().biddable().unwrap();
    card.set_input("150000");
    let mut handle = card.submit_input(&bond, &session).unwrap();
    assert_eq!(card.status(), SubmissionStatus::Pending);

    let done = handle.wait().await;
    assert_eq!(done.status, SubmissionStatus::Confirmed);
    assert_eq!(
        done.transitions,
        vec![
            SubmissionStatus::Idle,
            SubmissionStatus::Pending,
            SubmissionStatus::Confirming,
            SubmissionStatus::Confirmed,
        ]
    );
    assert_eq!(done.block_number, Some(100));
    assert_eq!(card.input(), "");

    assert_eq!(
        settlement.calls(),
        vec![(1, EncodedAmount::from_raw(150_000 * 10u128.pow(18)))]
    );

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.severity, Severity::Success);
    assert_eq!(
        notice.description,
        "Your encrypted bid has been recorded on the blockchain"
    );
    assert!(notices.try_recv().is_err());

    assert!(card.reset());
    assert_eq!(card.status(), SubmissionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_wallet_scenario() {
    let settlement = MockSettlement::new();
    let (card, mut notices) = controller(&settlement, &MockReceipts::succeeding());
    let (connector, session) = wallet::session();
    let bond = BondCatalog::demo().get("3").unwrap().biddable().unwrap();

    for raw in ["", "abc", "1", "150000"] {
        let err = card.submit(&bond, raw, &session).err().unwrap();
        assert_eq!(err, BidError::WalletNotConnected);
        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.title, "Wallet Not Connected");
    }
    assert_eq!(settlement.call_count(), 0);

    connector.connect(address());
    let mut handle = card.submit(&bond, "150000", &session).unwrap();
    assert_eq!(handle.wait().await.status, SubmissionStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_double_submit_scenario() {
    let settlement = MockSettlement::new();
    let receipts = MockReceipts::new(ReceiptBehavior::Succeed { after_polls: 5 });
    let (card, _notices) = controller(&settlement, &receipts);
    let session = wallet::StaticWallet::connected(address());
    let bond = BondCatalog::demo().get("1").unwrap().biddable().unwrap();

    let mut first = card.submit(&bond, "150000", &session).unwrap();
    for _ in 0..3 {
        let err = card.submit(&bond, "150000", &session).err().unwrap();
        assert!(matches!(err, BidError::SubmissionInProgress { .. }));
    }

    let done = first.wait().await;
    assert_eq!(done.id, *first.id());
    assert_eq!(done.status, SubmissionStatus::Confirmed);
    assert_eq!(settlement.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_bid_keeps_input() {
    let settlement = MockSettlement::new();
    let receipts = MockReceipts::new(ReceiptBehavior::Revert { after_polls: 2 });
    let (card, mut notices) = controller(&settlement, &receipts);
    let session = wallet::StaticWallet::connected(address());
    let bond = BondCatalog::demo().get("1").unwrap().biddable().unwrap();

    let mut handle = card.submit(&bond, "125000.50", &session).unwrap();
    let done = handle.wait().await;
    assert_eq!(done.status, SubmissionStatus::Failed);
    assert!(matches!(
        done.error,
        Some(BidError::TransactionReverted { block_number: 100, .. })
    ));
    assert_eq!(card.input(), "125000.50");

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.severity, Severity::Destructive);
    assert_eq!(notice.title, "Encrypted Bid Failed");
}

#[tokio::test(start_paused = true)]
async fn test_cards_are_independent() {
    let settlement = MockSettlement::new();
    let receipts = MockReceipts::new(ReceiptBehavior::Succeed { after_polls: 2 });
    let (first_card, _a) = controller(&settlement, &receipts);
    let (second_card, _b) = controller(&settlement, &receipts);
    let session = wallet::StaticWallet::connected(address());
    let catalog = BondCatalog::demo();
    let techcorp = catalog.get("1").unwrap().biddable().unwrap();
    let energy = catalog.get("3").unwrap().biddable().unwrap();

    let mut a = first_card.submit(&techcorp, "100000", &session).unwrap();
    let mut b = second_card.submit(&energy, "150000", &session).unwrap();

    assert_eq!(a.wait().await.status, SubmissionStatus::Confirmed);
    assert_eq!(b.wait().await.status, SubmissionStatus::Confirmed);
    assert_eq!(settlement.call_count(), 2);
}
