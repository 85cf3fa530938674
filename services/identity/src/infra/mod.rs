pub mod credential;
pub mod memory;
pub mod notify;
pub mod rate_limit;
