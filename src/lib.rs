// Dispatch reports - reconciliation core of the reporting dashboard
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
