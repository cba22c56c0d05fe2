pub mod cache;
pub mod coordinator;
pub mod gateways;
pub mod messaging;
pub mod persistence;
pub mod retry;
