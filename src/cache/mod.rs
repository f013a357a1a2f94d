pub mod coordinator;
pub mod timer;
