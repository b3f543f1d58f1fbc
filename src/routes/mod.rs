pub mod diagnostics;
pub mod health;
pub mod poller;
pub mod responses;
