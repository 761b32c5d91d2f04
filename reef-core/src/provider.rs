//! Provider - Traits abstracting resource operations
//!
//! A Provider exposes a configuration schema, a `configure` step that builds
//! the shared client handle (`Meta`), and catalogues of resource types and
//! data sources. Resource handlers are async and operate on a
//! [`ResourceData`] bag; the lifecycle driver in `interpreter` decides which
//! handler runs for a given host intent.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::differ::ResourceDiff;
use crate::resource::{Attributes, ResourceData, ResourceId};
use crate::schema::{ResourceSchema, TypeError};

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration rejected at plan time
    Validation,
    /// Remote object does not exist (HTTP 404)
    NotFound,
    /// Remote object is in a conflicting state (409/412/422)
    Conflict,
    Forbidden,
    /// 5xx, 429 and network failures
    Transient,
    Timeout,
    Cancelled,
    CredentialsMissing,
    InvalidCompositeId,
    /// A waiter observed a state outside pending and target
    UnexpectedState,
    /// Any other remote rejection
    Api,
    Internal,
}

impl ErrorKind {
    /// Map an HTTP status to a kind
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorKind::NotFound,
            409 | 412 | 422 => ErrorKind::Conflict,
            403 => ErrorKind::Forbidden,
            429 => ErrorKind::Transient,
            s if s >= 500 => ErrorKind::Transient,
            _ => ErrorKind::Api,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Transient => "transient",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::CredentialsMissing => "credentials missing",
            ErrorKind::InvalidCompositeId => "invalid composite id",
            ErrorKind::UnexpectedState => "unexpected state",
            ErrorKind::Api => "api",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status of the failed remote call, if any
    pub status: Option<u16>,
    /// Attribute path the error refers to, if any
    pub attribute: Option<String>,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            attribute: None,
            resource_id: None,
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    /// Error from a failed remote call, classified by its status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::from_status(status), message);
        err.status = Some(status);
        err
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Prefix the message, keeping kind and status
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Structured message surfaced to the host
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(err: &ProviderError) -> Self {
        let mut diag = Diagnostic::error(err.to_string());
        diag.attribute = err.attribute.clone();
        diag.detail = std::error::Error::source(err).map(|c| c.to_string());
        diag
    }
}

impl From<&TypeError> for Diagnostic {
    fn from(err: &TypeError) -> Self {
        let mut diag = Diagnostic::error(err.to_string());
        diag.attribute = err.path();
        diag
    }
}

/// Per-call context handed to every handler
pub struct Context<M> {
    /// Client handle produced by `Provider::configure`
    pub meta: Arc<M>,
    /// Host cancellation; waiters and retry loops observe it
    pub cancel: CancellationToken,
}

impl<M> Clone for Context<M> {
    fn clone(&self) -> Self {
        Self {
            meta: Arc::clone(&self.meta),
            cancel: self.cancel.clone(),
        }
    }
}

impl<M> Context<M> {
    pub fn new(meta: Arc<M>, cancel: CancellationToken) -> Self {
        Self { meta, cancel }
    }
}

/// Definition of a managed resource kind
#[async_trait]
pub trait ResourceType<M: Send + Sync + 'static>: Send + Sync {
    /// Resource kind name (e.g., "record")
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Plan-time hook: cross-field validation, extra force-new marks
    fn customize_diff(&self, _diff: &mut ResourceDiff) -> ProviderResult<()> {
        Ok(())
    }

    /// Create the remote object and `set_id`; usually ends with a read
    async fn create(&self, ctx: &Context<M>, data: &mut ResourceData) -> ProviderResult<()>;

    /// Refresh the bag from the remote object; `clear_id` when it is gone
    async fn read(&self, ctx: &Context<M>, data: &mut ResourceData) -> ProviderResult<()>;

    async fn update(&self, ctx: &Context<M>, data: &mut ResourceData) -> ProviderResult<()>;

    async fn delete(&self, ctx: &Context<M>, data: &mut ResourceData) -> ProviderResult<()>;

    /// Translate an import id into the bag's id and any seed attributes.
    /// The default keeps the id as given.
    async fn import(&self, _ctx: &Context<M>, _data: &mut ResourceData) -> ProviderResult<()> {
        Ok(())
    }
}

/// Read-only query exposed to the host
#[async_trait]
pub trait DataSource<M: Send + Sync + 'static>: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Populate the bag from the query attributes; must `set_id`
    async fn read(&self, ctx: &Context<M>, data: &mut ResourceData) -> ProviderResult<()>;
}

/// Main Provider trait
///
/// Each infrastructure provider implements this trait. `configure` builds the
/// shared client handle; every handler receives it through [`Context`].
pub trait Provider: Send + Sync {
    type Meta: Send + Sync + 'static;

    /// Name of this Provider (e.g., "digitalocean")
    fn name(&self) -> &'static str;

    /// Schema of the provider configuration block
    fn schema(&self) -> ResourceSchema;

    fn configure<'a>(&'a self, config: &'a Attributes) -> BoxFuture<'a, ProviderResult<Self::Meta>>;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType<Self::Meta>>>;

    fn data_sources(&self) -> Vec<Box<dyn DataSource<Self::Meta>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, AttributeType};

    struct MockMeta;

    struct MockResource;

    #[async_trait]
    impl ResourceType<MockMeta> for MockResource {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("mock")
                .attribute(AttributeSchema::new("name", AttributeType::String).required())
        }

        async fn create(&self, _ctx: &Context<MockMeta>, data: &mut ResourceData) -> ProviderResult<()> {
            data.set_id("mock-id-123");
            Ok(())
        }

        async fn read(&self, _ctx: &Context<MockMeta>, data: &mut ResourceData) -> ProviderResult<()> {
            if data.id_str() == "gone" {
                data.clear_id();
            }
            Ok(())
        }

        async fn update(&self, _ctx: &Context<MockMeta>, _data: &mut ResourceData) -> ProviderResult<()> {
            Ok(())
        }

        async fn delete(&self, _ctx: &Context<MockMeta>, _data: &mut ResourceData) -> ProviderResult<()> {
            Ok(())
        }
    }

    fn ctx() -> Context<MockMeta> {
        Context::new(Arc::new(MockMeta), CancellationToken::new())
    }

    #[tokio::test]
    async fn mock_resource_create_sets_id() {
        let mut data = ResourceData::new("mock");
        MockResource.create(&ctx(), &mut data).await.unwrap();
        assert_eq!(data.id(), Some("mock-id-123"));
    }

    #[tokio::test]
    async fn mock_resource_read_clears_missing() {
        let mut data = ResourceData::new("mock");
        data.set_id("gone");
        MockResource.read(&ctx(), &mut data).await.unwrap();
        assert!(data.to_state().is_none());
    }

    #[test]
    fn status_classification() {
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(412), ErrorKind::Conflict);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Conflict);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Forbidden);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Api);
    }

    #[test]
    fn error_display_includes_resource_and_context() {
        let err = ProviderError::from_status(404, "The resource you were accessing could not be found.")
            .with_context("Error retrieving domain record")
            .for_resource(ResourceId::new("record", "3352896"));
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "[record.3352896] Error retrieving domain record: The resource you were accessing could not be found."
        );
    }

    #[test]
    fn diagnostic_from_type_error_carries_path() {
        let err = TypeError::MissingRequired {
            name: "domain".to_string(),
        };
        let diag = Diagnostic::from(&err);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.attribute.as_deref(), Some("domain"));
    }
}
