pub mod event_store;
pub mod storage;
