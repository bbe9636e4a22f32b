pub mod event_queries;
pub mod ownership;
pub mod report_queries;
