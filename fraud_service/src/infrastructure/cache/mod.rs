pub mod fraud_cache;
