use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::admission_request::{AdmissionRequest, GroupVersionKind};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("there is no content to decode")]
    NoContent,

    #[error("object is missing the '{0}' field")]
    MissingTypeField(&'static str),

    #[error("no kind \"{}\" is registered for version \"{}\"", .0.kind, .0.version)]
    NotRegistered(GroupVersionKind),

    #[error("unable to decode {found} into {expected}")]
    KindMismatch {
        expected: GroupVersionKind,
        found: GroupVersionKind,
    },

    #[error("cannot decode object: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// The registry of kinds a [`Decoder`] is allowed to produce
#[derive(Clone, Debug, Default)]
pub struct Scheme {
    kinds: HashSet<GroupVersionKind>,
}

impl Scheme {
    pub fn new() -> Self {
        Scheme::default()
    }

    /// Scheme knowing about the core resources handled by the webhook
    pub fn with_core_types() -> Self {
        let mut scheme = Scheme::new();
        scheme.register::<k8s_openapi::api::core::v1::Pod>();
        scheme
    }

    pub fn register<K: k8s_openapi::Resource>(&mut self) -> &mut Self {
        self.kinds.insert(GroupVersionKind::of::<K>());
        self
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds.contains(gvk)
    }
}

/// Turns the raw objects embedded inside of admission requests into typed
/// Kubernetes resources.
#[derive(Clone, Debug)]
pub struct Decoder {
    scheme: Arc<Scheme>,
}

impl Decoder {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Decoder { scheme }
    }

    /// Decode the `object` of the admission request
    pub fn decode<K>(&self, request: &AdmissionRequest) -> Result<K, DecodeError>
    where
        K: k8s_openapi::Resource + DeserializeOwned,
    {
        match &request.object {
            Some(raw) => self.decode_raw(raw),
            None => Err(DecodeError::NoContent),
        }
    }

    pub fn decode_raw<K>(&self, raw: &RawExtension) -> Result<K, DecodeError>
    where
        K: k8s_openapi::Resource + DeserializeOwned,
    {
        let obj = match &raw.0 {
            serde_json::Value::Null => return Err(DecodeError::NoContent),
            serde_json::Value::Object(obj) if obj.is_empty() => {
                return Err(DecodeError::NoContent)
            }
            serde_json::Value::Object(obj) => obj,
            _ => {
                return Err(DecodeError::Deserialize(serde::de::Error::custom(
                    "object is not a JSON map",
                )))
            }
        };

        let api_version = obj
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or(DecodeError::MissingTypeField("apiVersion"))?;
        let kind = obj
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or(DecodeError::MissingTypeField("kind"))?;

        let found = GroupVersionKind::from_api_version_and_kind(api_version, kind);
        if !self.scheme.recognizes(&found) {
            return Err(DecodeError::NotRegistered(found));
        }
        let expected = GroupVersionKind::of::<K>();
        if found != expected {
            return Err(DecodeError::KindMismatch { expected, found });
        }

        Ok(serde_json::from_value(raw.0.clone())?)
    }
}
