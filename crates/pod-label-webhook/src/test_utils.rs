use k8s_openapi::apimachinery::pkg::runtime::RawExtension;

use crate::admission_request::{AdmissionRequest, GroupVersionKind, GroupVersionResource};

pub(crate) fn build_pod_admission_request(
    operation: &str,
    object: serde_json::Value,
) -> AdmissionRequest {
    AdmissionRequest {
        uid: "705ab4f5-6393-11e8-b7cc-42010a800002".to_owned(),
        kind: GroupVersionKind::new("", "v1", "Pod"),
        resource: GroupVersionResource {
            group: String::new(),
            version: "v1".to_owned(),
            resource: "pods".to_owned(),
        },
        name: object["metadata"]["name"].as_str().map(str::to_owned),
        namespace: object["metadata"]["namespace"].as_str().map(str::to_owned),
        operation: operation.to_owned(),
        object: Some(RawExtension(object)),
        ..Default::default()
    }
}
