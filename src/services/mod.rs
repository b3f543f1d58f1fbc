pub mod fetcher;
pub mod poller;
pub mod record;
pub mod sink;
