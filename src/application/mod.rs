// Application layer - reconciliation and channel orchestration
pub mod channels;
pub mod connection;
pub mod data_source;
pub mod last_known_good;
pub mod reconciler;
pub mod timers;
pub mod validator;
