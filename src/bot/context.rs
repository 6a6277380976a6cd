use std::sync::Arc;

use crate::bot::router::Router;
use crate::store::PreferenceStore;

pub struct AppContext {
  router: Router,
}

impl AppContext {
  pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
    Self {
      router: Router::new(store),
    }
  }

  pub fn router(&self) -> &Router {
    &self.router
  }
}
