use std::sync::Arc;

use crate::handler::AdmissionHandler;

pub(crate) struct ApiServerState {
    pub(crate) handler: Arc<dyn AdmissionHandler>,
}
