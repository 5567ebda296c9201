use crate::finder::Finder;
use std::sync::Arc;

pub struct AppState {
    pub finder: Arc<Finder>,
}
