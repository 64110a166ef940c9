use crate::admission_request::AdmissionRequest;
use crate::admission_response::AdmissionResponse;

/// A component able to answer admission requests.
///
/// The HTTP layer only knows about this trait, different mutation strategies
/// can be plugged in without touching the server.
#[cfg_attr(test, mockall::automock)]
pub trait AdmissionHandler: Send + Sync {
    fn handle(&self, request: &AdmissionRequest) -> AdmissionResponse;
}
