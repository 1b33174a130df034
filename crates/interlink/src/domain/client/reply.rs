//! Request bodies and decoded replies exchanged by the service client.

use std::any::{TypeId, type_name};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::endpoint::Schema;
use crate::domain::error::{ServiceError, ValidationStage};

/// JSON request body together with the identity of the type it came from.
///
/// Endpoints that declare a request schema are checked against that
/// identity before any network access. A body built with
/// [`RequestBody::from_value`] has no identity and is instead validated
/// structurally against the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    value: Value,
    origin: Option<(TypeId, &'static str)>,
}

impl RequestBody {
    /// Serialise `body`, remembering its type.
    ///
    /// # Errors
    ///
    /// Returns the serde error when `body` cannot be represented as JSON.
    pub fn json<T>(body: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + 'static,
    {
        Ok(Self {
            value: serde_json::to_value(body)?,
            origin: Some((TypeId::of::<T>(), type_name::<T>())),
        })
    }

    /// Wrap an untyped JSON document.
    #[must_use]
    pub const fn from_value(value: Value) -> Self {
        Self {
            value,
            origin: None,
        }
    }

    /// Serialised document.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Rust type name of the original body, when known.
    #[must_use]
    pub fn type_name(&self) -> Option<&'static str> {
        self.origin.map(|(_, name)| name)
    }

    pub(crate) fn into_value(self) -> Value {
        self.value
    }

    /// Check the body against `schema`.
    pub(crate) fn check(&self, schema: &Schema) -> Result<(), (String, Vec<String>)> {
        match self.origin {
            Some((type_id, _)) if schema.accepts(type_id) => Ok(()),
            Some((_, name)) => Err((
                format!(
                    "request body type {name} does not match expected type {}",
                    schema.type_name()
                ),
                Vec::new(),
            )),
            None => schema.validate(&self.value).map_err(|failures| {
                (
                    format!("request body does not match {}", schema.type_name()),
                    failures,
                )
            }),
        }
    }
}

/// Successful reply from a downstream service.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    endpoint: String,
    status: u16,
    body: Option<Value>,
}

impl Reply {
    pub(crate) const fn new(endpoint: String, status: u16, body: Option<Value>) -> Self {
        Self {
            endpoint,
            status,
            body,
        }
    }

    /// Endpoint key the reply answers.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP status of the reply; always 2xx.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Whether the service answered with an empty body.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// Borrow the JSON document, if any.
    #[must_use]
    pub const fn json(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Take the JSON document, if any.
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        self.body
    }

    /// Decode the reply into `T`. An empty body decodes as JSON `null`, so
    /// `Option<T>` and `()` accept it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] when the document does not match
    /// `T`.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, ServiceError> {
        let document = self.body.unwrap_or(Value::Null);
        serde_json::from_value(document).map_err(|error| ServiceError::Validation {
            endpoint: self.endpoint,
            stage: ValidationStage::Response,
            message: format!("response does not match {}", type_name::<T>()),
            failures: vec![error.to_string()],
        })
    }
}
