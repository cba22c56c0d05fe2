pub mod alert_repository;
