pub mod error;
pub mod identity;
pub mod posts;
pub mod server;
pub mod storage;
pub mod validation;
