//! Integration tests for the three-step payment state machine.

mod common;

use common::{Fixture, LOOKUP_TIMEOUT};
use futures::future::join_all;
use settlement_service::error::SettlementError;
use settlement_service::settlement::{PaymentStepStateMachine, SettlementState, SettlementStep};
use settlement_service::store::SettlementStore;
use SettlementStep::*;

fn machine(fixture: &Fixture) -> PaymentStepStateMachine {
    PaymentStepStateMachine::new(fixture.store.clone(), LOOKUP_TIMEOUT)
}

#[tokio::test]
async fn test_full_settlement_chain() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-100", "1000").await;
    let payments = machine(&fixture);

    let step1 = payments
        .mark_paid(&fixture.distributor_scope(), invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();
    assert_eq!(step1.payment_status.state(), Some(SettlementState::ClientCollected));
    assert_eq!(
        step1.payment_status.client_to_distributor.marked_by,
        Some(fixture.distributor.distributor_id)
    );

    payments
        .mark_paid(&fixture.admin, invoice.invoice_id, DistributorToAdmin)
        .await
        .unwrap();
    let settled = payments
        .mark_paid(&fixture.admin, invoice.invoice_id, AdminToCompany)
        .await
        .unwrap();
    assert_eq!(settled.payment_status.state(), Some(SettlementState::Settled));

    let stored = fixture
        .store
        .get_invoice(invoice.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status, settled.payment_status);
}

#[tokio::test]
async fn test_skipping_a_step_is_rejected() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-101", "1000").await;

    let err = machine(&fixture)
        .mark_paid(&fixture.admin, invoice.invoice_id, DistributorToAdmin)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SettlementError::OutOfOrder {
            step: DistributorToAdmin,
            blocking: ClientToDistributor
        }
    ));
}

#[tokio::test]
async fn test_remarking_keeps_original_record() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-102", "1000").await;
    let payments = machine(&fixture);

    let first = payments
        .mark_paid(&fixture.distributor_scope(), invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();

    let err = payments
        .mark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::AlreadyPaid {
            step: ClientToDistributor
        }
    ));

    let stored = fixture
        .store
        .get_invoice(invoice.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.payment_status.client_to_distributor,
        first.payment_status.client_to_distributor
    );
}

#[tokio::test]
async fn test_admin_steps_require_admin() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-103", "1000").await;
    let payments = machine(&fixture);

    payments
        .mark_paid(&fixture.distributor_scope(), invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();

    let err = payments
        .mark_paid(&fixture.distributor_scope(), invoice.invoice_id, DistributorToAdmin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Permission(_)));

    let err = payments
        .mark_paid(&fixture.supervisor_scope(), invoice.invoice_id, DistributorToAdmin)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Permission(_)));
}

#[tokio::test]
async fn test_other_distributor_cannot_see_invoice() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-104", "1000").await;

    let err = machine(&fixture)
        .mark_paid(
            &fixture.other_distributor_scope(),
            invoice.invoice_id,
            ClientToDistributor,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::NotFound(_)));
}

#[tokio::test]
async fn test_unmark_then_remark_round_trip() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-105", "1000").await;
    let payments = machine(&fixture);

    payments
        .mark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();
    let reverted = payments
        .unmark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();

    let record = &reverted.payment_status.client_to_distributor;
    assert!(!record.is_paid);
    assert!(record.marked_by.is_none());
    assert!(record.marked_at.is_none());
    assert_eq!(reverted.payment_status.state(), Some(SettlementState::Unsettled));

    let again = payments
        .mark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();
    assert_eq!(again.payment_status.state(), Some(SettlementState::ClientCollected));
}

#[tokio::test]
async fn test_unmark_with_later_step_paid_is_rejected() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-106", "1000").await;
    let payments = machine(&fixture);

    payments
        .mark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();
    payments
        .mark_paid(&fixture.admin, invoice.invoice_id, DistributorToAdmin)
        .await
        .unwrap();

    let err = payments
        .unmark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::OutOfOrder {
            step: ClientToDistributor,
            blocking: DistributorToAdmin
        }
    ));

    let stored = fixture
        .store
        .get_invoice(invoice.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status.state(), Some(SettlementState::AdminRemitted));
}

#[tokio::test]
async fn test_unmark_unpaid_step_and_non_admin() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-107", "1000").await;
    let payments = machine(&fixture);

    let err = payments
        .unmark_paid(&fixture.admin, invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::NotPaid {
            step: ClientToDistributor
        }
    ));

    payments
        .mark_paid(&fixture.distributor_scope(), invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap();
    let err = payments
        .unmark_paid(&fixture.distributor_scope(), invoice.invoice_id, ClientToDistributor)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Permission(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_marks_have_single_winner() {
    let fixture = Fixture::seed().await;
    let invoice = fixture.create_invoice("INV-108", "1000").await;
    let payments = machine(&fixture);

    let attempts = (0..8).map(|_| {
        let payments = payments.clone();
        let admin = fixture.admin.clone();
        let invoice_id = invoice.invoice_id;
        tokio::spawn(async move {
            payments
                .mark_paid(&admin, invoice_id, ClientToDistributor)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(SettlementError::AlreadyPaid {
                step: ClientToDistributor
            })
        ));
    }
}

#[tokio::test]
async fn test_missing_invoice_is_not_found() {
    let fixture = Fixture::seed().await;

    let err = machine(&fixture)
        .mark_paid(&fixture.admin, uuid::Uuid::new_v4(), ClientToDistributor)
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::NotFound(_)));
}
