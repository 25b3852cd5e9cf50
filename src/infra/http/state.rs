use std::sync::Arc;

use crate::application::conversions::ConversionService;

#[derive(Clone)]
pub struct ApiState {
    pub conversions: Arc<ConversionService>,
}
