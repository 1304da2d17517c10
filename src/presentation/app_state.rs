// Application state for HTTP handlers
use crate::application::data_source::DataSourceHandle;

#[derive(Clone)]
pub struct AppState {
    pub source: DataSourceHandle,
}
