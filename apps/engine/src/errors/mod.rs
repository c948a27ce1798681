//! Error vocabulary shared by the domain and service layers.

pub mod domain;
pub mod error_code;

pub use domain::DomainError;
pub use error_code::ErrorCode;
