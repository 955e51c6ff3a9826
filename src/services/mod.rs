pub mod key_service;
pub mod usage_service;
