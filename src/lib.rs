pub mod app;
pub mod client;
pub mod conf;
pub mod dashboard;
pub mod decode;
pub mod processor;
pub mod report;
pub mod storage;
pub mod trigger;
