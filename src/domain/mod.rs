// Domain layer - report state, payloads and query parameters
pub mod payload;
pub mod query;
pub mod report;
