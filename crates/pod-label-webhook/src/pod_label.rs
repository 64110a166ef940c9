use k8s_openapi::api::core::v1::Pod;
use tracing::{error, info, Span};

use crate::admission_request::AdmissionRequest;
use crate::admission_response::AdmissionResponse;
use crate::decoder::Decoder;
use crate::handler::AdmissionHandler;

/// Path the webhook is registered at.
///
/// Registration: mutating=true, failurePolicy=fail, sideEffects=None,
/// groups=core, resources=pods, verbs=create;update, versions=v1,
/// name=mpod.kb.io, admissionReviewVersions=v1
pub const MUTATE_POD_PATH: &str = "/mutate-core-v1-pod";

pub const POD_LABEL_KEY: &str = "ganesh-label";
pub const POD_LABEL_VALUE: &str = "my-test-label";
pub const POD_ANNOTATION_KEY: &str = "test";
pub const POD_ANNOTATION_VALUE: &str = "test";

/// Mutating handler that labels and annotates every Pod it receives
pub struct PodLabel {
    client: Option<kube::Client>,
    decoder: Decoder,
    logger: Span,
}

impl PodLabel {
    /// `client` is not used while mutating Pods, it's `None` when the
    /// server runs without a connection to Kubernetes.
    pub fn new(client: Option<kube::Client>, decoder: Decoder, logger: Span) -> Self {
        PodLabel {
            client,
            decoder,
            logger,
        }
    }

    /// The span all the log events of the handler are recorded under
    pub fn default_logger() -> Span {
        tracing::info_span!("pod-webhook")
    }

    pub fn client(&self) -> Option<&kube::Client> {
        self.client.as_ref()
    }
}

impl AdmissionHandler for PodLabel {
    fn handle(&self, request: &AdmissionRequest) -> AdmissionResponse {
        let _enter = self.logger.enter();
        info!("Pod create/update event");

        let mut pod: Pod = match self.decoder.decode(request) {
            Ok(pod) => pod,
            Err(e) => {
                error!(error = %e, "error decoding the admission request");
                return AdmissionResponse::errored(request.uid.clone(), 400, e.to_string());
            }
        };

        info!(
            pod = pod.metadata.name.as_deref().unwrap_or_default(),
            "handling the pod CREATE/UPDATE event"
        );

        label_pod(&mut pod);

        let mutated = match serde_json::to_vec(&pod) {
            Ok(mutated) => mutated,
            Err(e) => {
                error!(error = %e, "cannot serialize the mutated pod");
                return AdmissionResponse::errored(request.uid.clone(), 500, e.to_string());
            }
        };
        // the decoder already rejected requests without an object
        let original = match request.object.as_ref().map(|raw| serde_json::to_vec(&raw.0)) {
            Some(Ok(original)) => original,
            Some(Err(e)) => {
                return AdmissionResponse::errored(request.uid.clone(), 500, e.to_string());
            }
            None => Vec::new(),
        };

        info!(
            namespace = pod.metadata.namespace.as_deref().unwrap_or_default(),
            "the following pod has been labeled successfully"
        );
        AdmissionResponse::patch_response_from_raw(request.uid.clone(), &original, &mutated)
    }
}

/// Add the webhook label and annotation, creating the maps when missing
pub(crate) fn label_pod(pod: &mut Pod) {
    pod.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(POD_LABEL_KEY.to_owned(), POD_LABEL_VALUE.to_owned());
    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(POD_ANNOTATION_KEY.to_owned(), POD_ANNOTATION_VALUE.to_owned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_response::PatchType;
    use crate::decoder::Scheme;
    use crate::test_utils::build_pod_admission_request;
    use base64::{engine::general_purpose, Engine as _};
    use rstest::rstest;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn handler() -> PodLabel {
        let decoder = Decoder::new(Arc::new(Scheme::with_core_types()));
        PodLabel::new(None, decoder, PodLabel::default_logger())
    }

    fn nginx_pod() -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "nginx",
                "namespace": "default"
            },
            "spec": {
                "containers": [{"name": "nginx", "image": "nginx:1.27"}]
            }
        })
    }

    fn apply_response_patch(
        original: &serde_json::Value,
        response: &AdmissionResponse,
    ) -> serde_json::Value {
        let mut patched = original.clone();
        if let Some(patch) = &response.patch {
            let decoded = general_purpose::STANDARD.decode(patch).unwrap();
            let patch: json_patch::Patch = serde_json::from_slice(&decoded).unwrap();
            json_patch::patch(&mut patched, &patch).unwrap();
        }
        patched
    }

    fn labels_of(object: &serde_json::Value) -> BTreeMap<String, String> {
        serde_json::from_value(object["metadata"]["labels"].clone()).unwrap()
    }

    #[test]
    fn label_pod_is_idempotent() {
        let mut once: Pod = serde_json::from_value(nginx_pod()).unwrap();
        label_pod(&mut once);
        let mut twice = once.clone();
        label_pod(&mut twice);

        assert_eq!(once.metadata.labels, twice.metadata.labels);
        assert_eq!(once.metadata.annotations, twice.metadata.annotations);
    }

    #[test]
    fn label_pod_keeps_existing_entries() {
        let mut pod: Pod = serde_json::from_value(nginx_pod()).unwrap();
        pod.metadata.labels = Some(BTreeMap::from([("app".to_owned(), "web".to_owned())]));
        pod.metadata.annotations = Some(BTreeMap::from([("a".to_owned(), "b".to_owned())]));

        label_pod(&mut pod);

        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["app"], "web");
        assert_eq!(labels[POD_LABEL_KEY], POD_LABEL_VALUE);
        let annotations = pod.metadata.annotations.unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[POD_ANNOTATION_KEY], POD_ANNOTATION_VALUE);
    }

    #[test]
    fn nginx_pod_without_labels_gets_labeled() {
        let original = nginx_pod();
        let request = build_pod_admission_request("CREATE", original.clone());

        let response = handler().handle(&request);

        assert!(response.allowed);
        assert_eq!(response.uid, request.uid);
        assert_eq!(response.patch_type, Some(PatchType::JSONPatch));
        assert!(response.status.is_none());

        let patched = apply_response_patch(&original, &response);
        assert_eq!(
            labels_of(&patched),
            BTreeMap::from([(POD_LABEL_KEY.to_owned(), POD_LABEL_VALUE.to_owned())])
        );
        assert_eq!(patched["metadata"]["name"], "nginx");
        assert_eq!(patched["metadata"]["namespace"], "default");
    }

    #[test]
    fn pod_without_annotations_gets_annotated() {
        let original = nginx_pod();
        assert!(original["metadata"].get("annotations").is_none());
        let request = build_pod_admission_request("CREATE", original.clone());

        let response = handler().handle(&request);

        assert!(response.allowed);
        let patched = apply_response_patch(&original, &response);
        assert_eq!(
            patched["metadata"]["annotations"],
            json!({ POD_ANNOTATION_KEY: POD_ANNOTATION_VALUE })
        );
    }

    #[rstest]
    #[case::no_metadata_maps(nginx_pod())]
    #[case::existing_labels(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "web",
            "namespace": "prod",
            "labels": {"app": "web", "ganesh-label": "stale"},
            "annotations": {"owner": "team-a"}
        },
        "spec": {"containers": [{"name": "web", "image": "httpd"}]}
    }))]
    #[case::with_status(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "db", "namespace": "data", "uid": "1234"},
        "spec": {"containers": [{"name": "db", "image": "postgres"}], "nodeName": "node-1"},
        "status": {"phase": "Running"}
    }))]
    fn patch_turns_original_into_mutated_pod(#[case] original: serde_json::Value) {
        let request = build_pod_admission_request("UPDATE", original.clone());

        let response = handler().handle(&request);
        assert!(response.allowed);

        let mut expected: Pod = serde_json::from_value(original.clone()).unwrap();
        label_pod(&mut expected);

        let patched = apply_response_patch(&original, &response);
        assert_eq!(patched, serde_json::to_value(&expected).unwrap());
    }

    #[test]
    fn already_labeled_pod_produces_no_patch() {
        let mut pod: Pod = serde_json::from_value(nginx_pod()).unwrap();
        label_pod(&mut pod);
        let request = build_pod_admission_request("UPDATE", serde_json::to_value(&pod).unwrap());

        let response = handler().handle(&request);

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
    }

    #[rstest]
    #[case::not_a_pod(json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "d"}}))]
    #[case::broken_metadata(json!({"apiVersion": "v1", "kind": "Pod", "metadata": "nope"}))]
    #[case::no_content(json!(null))]
    fn malformed_object_is_bad_request(#[case] object: serde_json::Value) {
        let request = build_pod_admission_request("CREATE", object);

        let response = handler().handle(&request);

        assert!(!response.allowed);
        assert_eq!(response.uid, request.uid);
        assert!(response.patch.is_none());
        let status = response.status.unwrap();
        assert_eq!(status.code, Some(400));
        assert!(!status.message.unwrap().is_empty());
    }
}
