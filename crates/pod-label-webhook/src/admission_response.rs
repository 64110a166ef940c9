use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("cannot parse original object: {0}")]
    OriginalObject(#[source] serde_json::Error),

    #[error("cannot parse mutated object: {0}")]
    MutatedObject(#[source] serde_json::Error),

    #[error("cannot serialize patch: {0}")]
    SerializePatch(#[source] serde_json::Error),
}

/// This models the admission/v1/AdmissionResponse object of Kubernetes
/// See https://pkg.go.dev/k8s.io/kubernetes/pkg/apis/admission#AdmissionResponse
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID is an identifier for the individual request/response.
    /// This must be copied over from the corresponding AdmissionRequest.
    pub uid: String,

    /// Allowed indicates whether or not the admission request was permitted.
    pub allowed: bool,

    /// The type of Patch. Currently we only allow "JSONPatch".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// The patch body, base64 encoded. Only "JSONPatch" (RFC 6902) is supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Status contains extra details into why an admission request was denied.
    /// This field IS NOT consulted in any way if "Allowed" is "true".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_annotations: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// PatchType is the type of patch being used to represent the mutated object
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct AdmissionResponseStatus {
    /// A human-readable description of the status of this operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Suggested HTTP return code for this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl AdmissionResponse {
    /// Accept the request without touching the object
    pub fn allowed(uid: String) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: true,
            ..Default::default()
        }
    }

    /// Reject the request because of an error, `code` is the HTTP status
    /// suggested to the API server
    pub fn errored(uid: String, code: u16, message: String) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: false,
            status: Some(AdmissionResponseStatus {
                message: Some(message),
                code: Some(code),
            }),
            ..Default::default()
        }
    }

    /// Accept the request, describing the mutation as the JSON Patch that turns
    /// `original` into `current`. Both are raw JSON documents.
    ///
    /// Failing to compute the patch is reported as an internal error.
    pub fn patch_response_from_raw(uid: String, original: &[u8], current: &[u8]) -> AdmissionResponse {
        match json_patch_from_raw(original, current) {
            Ok(patch) => {
                let patch_type = patch.as_ref().map(|_| PatchType::JSONPatch);
                AdmissionResponse {
                    uid,
                    allowed: true,
                    patch_type,
                    patch,
                    ..Default::default()
                }
            }
            Err(e) => AdmissionResponse::errored(uid, 500, e.to_string()),
        }
    }
}

/// Compute the base64 encoded JSON Patch between two raw JSON documents.
/// `None` is returned when the documents are equal.
fn json_patch_from_raw(original: &[u8], current: &[u8]) -> Result<Option<String>, ResponseError> {
    let original: serde_json::Value =
        serde_json::from_slice(original).map_err(ResponseError::OriginalObject)?;
    let current: serde_json::Value =
        serde_json::from_slice(current).map_err(ResponseError::MutatedObject)?;

    let diff = json_patch::diff(&original, &current);
    if diff.0.is_empty() {
        return Ok(None);
    }

    serde_json::to_string(&diff)
        .map(|s| Some(general_purpose::STANDARD.encode(s)))
        .map_err(ResponseError::SerializePatch)
}
