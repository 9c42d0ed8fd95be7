mod accrual_world;
mod setups;
mod steps;

pub use accrual_world::{AccrualSystem, AccrualWorld};
