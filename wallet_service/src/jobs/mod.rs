pub mod outbox_relay;
pub mod saga_recovery;
