pub mod transfer_legs;
pub mod wallet_ops;
