mod price_record_repository;

pub use price_record_repository::*;
