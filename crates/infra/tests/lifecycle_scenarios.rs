mod common;

use common::Fleet;

use printfleet_core::{DomainError, LifecycleOp, UnassignLevel, UnitStatus};
use printfleet_fleet::AssignmentRecord;
use printfleet_infra::{
    CallContext, DeleteConfirmation, EngineError, UnitSearch, ViewName, ViewRows,
};

fn record(unit: &printfleet_fleet::Assignment) -> AssignmentRecord {
    AssignmentRecord::from(unit)
}

#[tokio::test]
async fn unit_walks_pool_deploy_and_back() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let u1 = fleet.unit("XRX-1").await;

    // 1. assignToPool
    let r = record(&fleet.engine.assign_to_pool(&fleet.ctx, u1, c1.client).await.unwrap());
    assert_eq!(r.client_id, Some(c1.client));
    assert_eq!(r.department_location_id, None);
    assert_eq!(r.status, UnitStatus::Undeployed);

    // 2. deploy
    let r = record(
        &fleet
            .engine
            .deploy(&fleet.ctx, u1, c1.client, c1.location)
            .await
            .unwrap(),
    );
    assert_eq!(r.client_id, Some(c1.client));
    assert_eq!(r.department_location_id, Some(c1.location));
    assert_eq!(r.status, UnitStatus::Active);
    assert!(r.deployment_date.is_some());

    // 3. unassign location
    let r = record(
        &fleet
            .engine
            .unassign_at_level(&fleet.ctx, u1, UnassignLevel::Location)
            .await
            .unwrap(),
    );
    assert_eq!(r.client_id, Some(c1.client));
    assert_eq!(r.department_location_id, None);
    assert_eq!(r.status, UnitStatus::Undeployed);

    // 4. unassign client
    let r = record(
        &fleet
            .engine
            .unassign_at_level(&fleet.ctx, u1, UnassignLevel::Client)
            .await
            .unwrap(),
    );
    assert_eq!(r.client_id, None);
    assert_eq!(r.department_location_id, None);
    assert_eq!(r.status, UnitStatus::Available);
    assert_eq!(r.last_client_id, Some(c1.client));
}

#[tokio::test]
async fn transfer_moves_client_and_location_with_one_history_entry() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let c2 = fleet.site("Globex", "Research").await;
    let u1 = fleet.unit("XRX-5").await;
    fleet
        .engine
        .deploy(&fleet.ctx, u1, c1.client, c1.location)
        .await
        .unwrap();
    let before = fleet.engine.history(u1).await.unwrap().len();

    let r = record(
        &fleet
            .engine
            .transfer(&fleet.ctx, u1, c2.client, c2.location)
            .await
            .unwrap(),
    );
    assert_eq!(r.client_id, Some(c2.client));
    assert_eq!(r.department_location_id, Some(c2.location));
    assert_eq!(r.status, UnitStatus::Active);

    let history = fleet.engine.history(u1).await.unwrap();
    assert_eq!(history.len(), before + 1);
    let last = history.last().unwrap();
    assert_eq!(last.op, LifecycleOp::Transfer);
    assert_eq!(last.from.client_id, Some(c1.client));
    assert_eq!(last.from.location_id, Some(c1.location));
    assert_eq!(last.to.client_id, Some(c2.client));
    assert_eq!(last.to.location_id, Some(c2.location));
    assert_eq!(last.actor, fleet.ctx.actor());
}

#[tokio::test]
async fn decommissioned_unit_rejects_deploy() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let u1 = fleet.unit("XRX-6").await;
    fleet.engine.assign_to_pool(&fleet.ctx, u1, c1.client).await.unwrap();

    let r = record(&fleet.engine.decommission(&fleet.ctx, u1).await.unwrap());
    assert_eq!(r.status, UnitStatus::Decommissioned);

    let err = fleet
        .engine
        .deploy(&fleet.ctx, u1, c1.client, c1.location)
        .await
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidTransition {
            from: UnitStatus::Decommissioned,
            ..
        })
    ));
}

#[tokio::test]
async fn decommission_after_pool_return_keeps_last_client() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let u1 = fleet.unit("XRX-12").await;
    fleet.engine.assign_to_pool(&fleet.ctx, u1, c1.client).await.unwrap();
    fleet
        .engine
        .unassign_at_level(&fleet.ctx, u1, UnassignLevel::Client)
        .await
        .unwrap();

    let r = record(&fleet.engine.decommission(&fleet.ctx, u1).await.unwrap());
    assert_eq!(r.status, UnitStatus::Decommissioned);
    assert_eq!(r.client_id, None);
    assert_eq!(r.last_client_id, Some(c1.client));

    let stored = record(&fleet.engine.get(u1).await.unwrap());
    assert_eq!(stored.last_client_id, Some(c1.client));
}

#[tokio::test]
async fn restore_on_available_unit_is_rejected() {
    let fleet = Fleet::new().await;
    let u1 = fleet.unit("XRX-7").await;
    let err = fleet
        .engine
        .restore_to_available(&fleet.ctx, u1)
        .await
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidTransition {
            from: UnitStatus::Available,
            attempted: LifecycleOp::RestoreToAvailable,
        })
    ));
}

#[tokio::test]
async fn deploy_to_foreign_location_writes_nothing() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let c2 = fleet.site("Globex", "Research").await;
    let u1 = fleet.unit("XRX-8").await;

    let err = fleet
        .engine
        .deploy(&fleet.ctx, u1, c1.client, c2.location)
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Integrity(_))));

    let unit = fleet.engine.get(u1).await.unwrap();
    assert_eq!(unit.status(), UnitStatus::Available);
    assert_eq!(fleet.engine.history(u1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn closed_session_cancels_before_commit() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let u1 = fleet.unit("XRX-9").await;

    let closed = CallContext::system();
    closed.cancel_token().cancel();
    let err = fleet
        .engine
        .assign_to_pool(&closed, u1, c1.client)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Domain(DomainError::Cancelled));
    assert_eq!(
        fleet.engine.get(u1).await.unwrap().status(),
        UnitStatus::Available
    );
}

#[tokio::test]
async fn delete_record_needs_matching_serial_and_keeps_history() {
    let fleet = Fleet::new().await;
    let u1 = fleet.unit("XRX-10").await;

    let err = fleet
        .engine
        .delete_record(&fleet.ctx, u1, DeleteConfirmation::new("XRX-11"))
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

    fleet
        .engine
        .delete_record(&fleet.ctx, u1, DeleteConfirmation::new("XRX-10"))
        .await
        .unwrap();
    let err = fleet.engine.get(u1).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::NotFound { .. })));
    assert_eq!(fleet.engine.history(u1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn views_follow_committed_transitions() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let u1 = fleet.unit("XRX-20").await;
    let _u2 = fleet.unit("XRX-21").await;

    let ViewRows::Available(pool) = fleet.views.get_view(ViewName::Available, None).await.unwrap()
    else {
        panic!("expected available view");
    };
    assert_eq!(pool[0].available_count, 2);

    fleet
        .engine
        .deploy(&fleet.ctx, u1, c1.client, c1.location)
        .await
        .unwrap();

    let ViewRows::Available(pool) = fleet.views.get_view(ViewName::Available, None).await.unwrap()
    else {
        panic!("expected available view");
    };
    assert_eq!(pool[0].available_count, 1);

    let ViewRows::Assigned(assigned) = fleet
        .views
        .get_view(ViewName::Assigned, Some(c1.client))
        .await
        .unwrap()
    else {
        panic!("expected assigned view");
    };
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].assigned_count, 1);
    let unit = &assigned[0].units[0];
    assert_eq!(unit.location.as_ref().map(|l| l.id), Some(c1.location));
    assert_eq!(unit.client.as_ref().map(|c| c.name.as_str()), Some("Acme"));
    assert_eq!(unit.department.as_ref().map(|d| d.name.as_str()), Some("Finance"));
}

#[tokio::test]
async fn search_matches_serial_and_client_name() {
    let fleet = Fleet::new().await;
    let c1 = fleet.site("Acme", "Finance").await;
    let u1 = fleet.unit("XRX-30").await;
    let _u2 = fleet.unit("XRX-31").await;
    fleet.engine.assign_to_pool(&fleet.ctx, u1, c1.client).await.unwrap();

    let search = UnitSearch::new(std::sync::Arc::clone(&fleet.views));

    let by_serial = search.search_units(&fleet.ctx, "xrx-3", None).await.unwrap();
    assert_eq!(by_serial.len(), 2);

    let by_client = search.search_units(&fleet.ctx, "ACME", None).await.unwrap();
    assert_eq!(by_client.len(), 1);
    assert_eq!(by_client[0].unit.id, u1);

    assert!(search.search_units(&fleet.ctx, "   ", None).await.unwrap().is_empty());
}
