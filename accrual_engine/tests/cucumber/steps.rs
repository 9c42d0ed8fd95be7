use std::time::Duration;

use accrual_engine::{
    db_types::{OrderStatusType, Points},
    Disposition,
    LedgerManagement,
    OrderManagement,
    SubmitOrderResult,
};
use cucumber::{given, then, when};
use httpmock::{Method::GET, Mock};
use log::*;
use serde_json::{json, Value};

use crate::cucumber::{AccrualSystem, AccrualWorld};

async fn set_oracle_response(sys: &mut AccrualSystem, number: &str, status: u16, body: Option<Value>) {
    let path = format!("/api/orders/{number}");
    let mock = sys
        .oracle
        .mock_async(|when, then| {
            when.method(GET).path(path);
            let then = then.status(status);
            if let Some(body) = body {
                then.json_body(body);
            }
        })
        .await;
    // The oldest matching mock wins, so the old response is only removed once its replacement is in place
    if let Some(id) = sys.oracle_mocks.insert(number.to_string(), mock.id) {
        Mock::new(id, &sys.oracle).delete_async().await;
    }
}

#[given(expr = "the accrual oracle reports order {word} as {word}")]
async fn oracle_reports_status(world: &mut AccrualWorld, number: String, status: String) {
    let body = json!({"order": number, "status": status});
    set_oracle_response(world.system_mut(), &number, 200, Some(body)).await;
}

#[given(expr = "the accrual oracle reports order {word} as PROCESSED with an accrual of {float}")]
async fn oracle_reports_accrual(world: &mut AccrualWorld, number: String, accrual: f64) {
    let body = json!({"order": number, "status": "PROCESSED", "accrual": accrual});
    set_oracle_response(world.system_mut(), &number, 200, Some(body)).await;
}

#[given(expr = "the accrual oracle has no record of order {word}")]
async fn oracle_has_no_record(world: &mut AccrualWorld, number: String) {
    set_oracle_response(world.system_mut(), &number, 204, None).await;
}

#[when(expr = "user {int} submits order {word}")]
async fn submit_order(world: &mut AccrualWorld, user_id: i64, number: String) {
    let result = world.system().orders.submit_order(user_id, &number).await.expect("Error submitting order");
    assert!(matches!(result, SubmitOrderResult::Accepted(_)), "Order {number} was not new");
}

#[when(expr = "the task for order {word} from user {int} is processed")]
async fn process_task(world: &mut AccrualWorld, number: String, user_id: i64) {
    world.system_mut().process(&number, user_id).await;
}

#[when(expr = "the task for order {word} from user {int} is delivered {int} times")]
async fn process_task_repeatedly(world: &mut AccrualWorld, number: String, user_id: i64, times: usize) {
    for _ in 0..times {
        world.system_mut().process(&number, user_id).await;
    }
}

#[when("the reconciliation engine is running")]
async fn start_engine(world: &mut AccrualWorld) {
    let sys = world.system_mut();
    let reconciler = sys.reconciler.as_mut().expect("Reconciler has been shut down");
    reconciler.start();
    let recovered = reconciler.recover_pending().await.expect("Error recovering pending orders");
    debug!("Recovered {recovered} orders at start-up");
}

#[when("the reconciliation engine shuts down")]
async fn stop_engine(world: &mut AccrualWorld) {
    world.system_mut().shutdown().await;
}

#[then(expr = "order {word} has status {word}")]
async fn check_order_status(world: &mut AccrualWorld, number: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not a valid order status");
    let order = world.system().db.fetch_order_by_number(&number.as_str().into()).await.expect("Error fetching order");
    let order = order.expect("Order does not exist");
    assert_eq!(order.status, expected, "Order {number} has the wrong status");
}

#[then(expr = "order {word} eventually has status {word}")]
async fn wait_for_order_status(world: &mut AccrualWorld, number: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not a valid order status");
    let number = number.as_str().into();
    for _ in 0..100 {
        let order = world.system().db.fetch_order_by_number(&number).await.expect("Error fetching order");
        if order.map(|o| o.status) == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Order {number} never reached {expected}");
}

#[then(expr = "the engine will check order {word} again")]
async fn check_still_pending(world: &mut AccrualWorld, number: String) {
    let disposition = world.system().last_disposition.get(&number).expect("Order was never processed");
    assert_eq!(disposition, &Disposition::StillPending);
}

#[then(expr = "user {int} has a bonus balance of {word}")]
async fn check_balance(world: &mut AccrualWorld, user_id: i64, balance: String) {
    let expected = balance.parse::<Points>().expect("Not a valid amount");
    let summary = world.system().accounts.balance(user_id).await.expect("Error fetching balance");
    assert_eq!(summary.current, expected, "User #{user_id} has the wrong balance");
}

#[then(expr = "order {word} has {int} accrual entries")]
async fn check_accrual_entries(world: &mut AccrualWorld, number: String, count: usize) {
    let ops = world
        .system()
        .db
        .fetch_operations_for_order(&number.as_str().into())
        .await
        .expect("Error fetching ledger entries");
    let accruals = ops.iter().filter(|op| op.kind == accrual_engine::db_types::OperationKind::Accrual).count();
    assert_eq!(accruals, count, "Wrong number of accrual entries for {number}");
}

#[then(expr = "the accrual oracle was asked about order {word} {int} time(s)")]
async fn check_oracle_hits(world: &mut AccrualWorld, number: String, count: usize) {
    let sys = world.system();
    let id = *sys.oracle_mocks.get(&number).expect("The oracle knows nothing about this order");
    let hits = Mock::new(id, &sys.oracle).hits_async().await;
    assert_eq!(hits, count, "The oracle was asked about {number} {hits} times");
}
