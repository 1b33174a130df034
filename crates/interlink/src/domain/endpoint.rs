//! Logical endpoint descriptors and the schemas they declare.
//!
//! A [`ServiceEndpoint`] names a downstream service, a path template with
//! `{name}` placeholders, an HTTP method, optional request/response schemas and
//! an optional timeout override. Descriptors are immutable; the `with_*`
//! methods consume the value and return a new one.

use std::any::{TypeId, type_name};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// HTTP methods an endpoint may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl HttpMethod {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether a JSON body is sent with this method.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = EndpointValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(EndpointValidationError::UnsupportedMethod {
                method: s.to_owned(),
            }),
        }
    }
}

/// Validation failures raised while constructing a [`ServiceEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointValidationError {
    /// The service name was blank.
    #[error("service cannot be empty")]
    EmptyService,
    /// The path template was blank.
    #[error("path cannot be empty")]
    EmptyPath,
    /// The path template did not start with `/`.
    #[error("path must start with /, got '{path}'")]
    RelativePath {
        /// The rejected path.
        path: String,
    },
    /// The method name is not one of [`HttpMethod`].
    #[error("unsupported HTTP method: {method}")]
    UnsupportedMethod {
        /// The rejected method.
        method: String,
    },
}

/// Type-level description of a request or response payload.
///
/// Built from a serde type with [`Schema::of`]. The schema remembers the
/// type's identity, which request bodies are checked against, and a validator
/// that checks a JSON document deserialises into the type.
#[derive(Clone, Copy)]
pub struct Schema {
    type_id: TypeId,
    type_name: &'static str,
    validator: Option<fn(&Value) -> Result<(), String>>,
}

impl Schema {
    /// Schema for a payload type that can be validated from JSON.
    ///
    /// # Examples
    /// ```
    /// use interlink::domain::endpoint::Schema;
    /// use serde::Deserialize;
    /// use serde_json::json;
    ///
    /// #[derive(Deserialize)]
    /// struct Customer { id: String, name: String }
    ///
    /// let schema = Schema::of::<Customer>();
    /// assert!(schema.validate(&json!({"id": "1", "name": "Ada"})).is_ok());
    /// assert!(schema.validate(&json!({"id": "1"})).is_err());
    /// ```
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            validator: Some(validate_as::<T>),
        }
    }

    /// Schema for a request-only type: matched by identity, never parsed.
    #[must_use]
    pub fn for_request<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            validator: None,
        }
    }

    /// Fully qualified Rust type name of the payload.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether a value of the type identified by `type_id` satisfies the
    /// schema.
    #[must_use]
    pub fn accepts(&self, type_id: TypeId) -> bool {
        self.type_id == type_id
    }

    /// Validate a JSON document against the schema.
    ///
    /// # Errors
    ///
    /// Returns the list of validation failures when the document does not
    /// deserialise into the schema's type.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        match self.validator {
            Some(validator) => validator(value).map_err(|failure| vec![failure]),
            None => Ok(()),
        }
    }
}

fn validate_as<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    T::deserialize(value)
        .map(|_| ())
        .map_err(|error| error.to_string())
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schema").field(&self.type_name).finish()
    }
}

/// Immutable descriptor of one downstream call.
///
/// ## Invariants
/// - `service` is non-empty.
/// - `path` is non-empty and starts with `/`.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use interlink::domain::endpoint::{HttpMethod, ServiceEndpoint};
///
/// let endpoint = ServiceEndpoint::new("census", "/api/customers/{customer_id}", HttpMethod::Get)
///     .expect("valid endpoint")
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(endpoint.placeholders().collect::<Vec<_>>(), ["customer_id"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    service: String,
    path: String,
    method: HttpMethod,
    request_schema: Option<Schema>,
    response_schema: Option<Schema>,
    timeout: Option<Duration>,
}

impl ServiceEndpoint {
    /// Construct a descriptor, validating service name and path.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointValidationError`] when the service is blank or the
    /// path is blank or relative.
    pub fn new(
        service_name: impl Into<String>,
        path_template: impl Into<String>,
        method: HttpMethod,
    ) -> Result<Self, EndpointValidationError> {
        let service = service_name.into();
        let path = path_template.into();
        if service.trim().is_empty() {
            return Err(EndpointValidationError::EmptyService);
        }
        if path.is_empty() {
            return Err(EndpointValidationError::EmptyPath);
        }
        if !path.starts_with('/') {
            return Err(EndpointValidationError::RelativePath { path });
        }
        Ok(Self {
            service,
            path,
            method,
            request_schema: None,
            response_schema: None,
            timeout: None,
        })
    }

    /// Return a copy declaring the expected request body schema.
    #[must_use]
    pub fn with_request_schema(self, schema: Schema) -> Self {
        Self {
            request_schema: Some(schema),
            ..self
        }
    }

    /// Return a copy declaring the expected response body schema.
    #[must_use]
    pub fn with_response_schema(self, schema: Schema) -> Self {
        Self {
            response_schema: Some(schema),
            ..self
        }
    }

    /// Return a copy with an endpoint-specific timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Logical name of the target service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Path template, possibly containing `{name}` placeholders.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Declared request body schema.
    #[must_use]
    pub const fn request_schema(&self) -> Option<&Schema> {
        self.request_schema.as_ref()
    }

    /// Declared response body schema.
    #[must_use]
    pub const fn response_schema(&self) -> Option<&Schema> {
        self.response_schema.as_ref()
    }

    /// Endpoint-specific timeout override.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Names of the `{name}` placeholders in the path template.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        placeholders_in(&self.path)
    }
}

/// Iterate over `{name}` placeholders in `path`.
pub(crate) fn placeholders_in(path: &str) -> impl Iterator<Item = &str> {
    path.split('{')
        .skip(1)
        .filter_map(|fragment| fragment.split_once('}').map(|(name, _)| name))
        .filter(|name| !name.is_empty())
}
