pub mod orchestrator;
pub mod queue;
pub mod types;
pub mod worker;
