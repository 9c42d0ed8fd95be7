use std::{collections::HashMap, fmt::Debug, time::Duration};

use accrual_engine::{
    reconciler::ReconciliationTask,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    AccountApi,
    Disposition,
    HttpOracleClient,
    OracleClientConfig,
    OrderFlowApi,
    Reconciler,
    ReconcilerConfig,
    RetryPolicy,
    SqliteDatabase,
};
use cucumber::World;
use httpmock::MockServer;
use log::*;

#[derive(Default, Debug, World)]
pub struct AccrualWorld {
    pub system: Option<AccrualSystem>,
}

impl AccrualWorld {
    pub fn system(&self) -> &AccrualSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn system_mut(&mut self) -> &mut AccrualSystem {
        self.system.as_mut().expect("System not initialised")
    }
}

pub struct AccrualSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub oracle: MockServer,
    /// Ids of the oracle mocks currently registered for each order number
    pub oracle_mocks: HashMap<String, usize>,
    pub reconciler: Option<Reconciler<SqliteDatabase, HttpOracleClient>>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub accounts: AccountApi<SqliteDatabase>,
    pub last_disposition: HashMap<String, Disposition>,
}

impl Debug for AccrualSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccrualSystem({}, oracle at {})", self.db_path, self.oracle.base_url())
    }
}

impl AccrualSystem {
    pub async fn new() -> Self {
        let db_path = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        debug!("Created database: {db_path}");
        let oracle = MockServer::start_async().await;
        let client = HttpOracleClient::new(
            OracleClientConfig::new(oracle.base_url())
                .with_timeout(Duration::from_secs(2))
                .with_default_retry_after(Duration::from_millis(200)),
        )
        .expect("Error creating oracle client");
        let config = ReconcilerConfig::default()
            .with_workers(2)
            .with_poll_interval(Duration::from_millis(50))
            .with_retry_policy(RetryPolicy::new(Duration::from_millis(20), Duration::from_millis(200), 5));
        let reconciler = Reconciler::new(db.clone(), client, config, Default::default());
        let orders = OrderFlowApi::new(db.clone(), reconciler.handle());
        let accounts = AccountApi::new(db.clone());
        Self {
            db_path,
            db,
            oracle,
            oracle_mocks: HashMap::new(),
            reconciler: Some(reconciler),
            orders,
            accounts,
            last_disposition: HashMap::new(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<SqliteDatabase, HttpOracleClient> {
        self.reconciler.as_ref().expect("Reconciler has been shut down")
    }

    pub async fn process(&mut self, number: &str, user_id: i64) -> Disposition {
        let task = ReconciliationTask::new(number.into(), user_id);
        let disposition = self.reconciler().process_task(&task).await;
        debug!("Processed {task}: {disposition:?}");
        self.last_disposition.insert(number.to_string(), disposition.clone());
        disposition
    }

    pub async fn shutdown(&mut self) {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.shutdown().await;
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
