pub mod catalog;
pub mod http;
pub mod redis_storage;
pub mod session;
pub mod storage;
