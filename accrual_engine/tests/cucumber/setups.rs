use cucumber::given;

use crate::cucumber::{AccrualSystem, AccrualWorld};

#[given("a fresh install")]
async fn fresh_install(world: &mut AccrualWorld) {
    let system = AccrualSystem::new().await;
    world.system = Some(system);
}
