//! Interpreter - Drive resource handlers for host intents
//!
//! [`Lifecycle`] holds a configured provider (its client handle and its
//! catalogues) and maps plan, apply, refresh, import and destroy onto the
//! resource handlers. It owns the engine-wide rules: schema validation at
//! plan time, 404-as-drift on refresh, 404-as-success on delete, and returning
//! partial state when an apply fails after the remote object was created.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::differ::{self, DiffAction, ResourceDiff};
use crate::provider::{Context, DataSource, Provider, ProviderError, ProviderResult, ResourceType};
use crate::resource::{Attributes, Resource, ResourceData, ResourceId, State};
use crate::schema::{ResourceSchema, TypeError};

/// Failed apply, with whatever state the host should persist
#[derive(Debug)]
pub struct ApplyError {
    pub error: ProviderError,
    /// State to record despite the failure (e.g. the object was created
    /// but waiting for it failed)
    pub partial: Option<State>,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Configured provider ready to serve lifecycle calls
pub struct Lifecycle<M: Send + Sync + 'static> {
    provider_name: &'static str,
    meta: Arc<M>,
    resources: HashMap<&'static str, Box<dyn ResourceType<M>>>,
    data_sources: HashMap<&'static str, Box<dyn DataSource<M>>>,
    cancel: CancellationToken,
}

fn validation_error(errors: &[TypeError]) -> ProviderError {
    let message = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
    let mut err = ProviderError::validation(message);
    if let Some(path) = errors.first().and_then(TypeError::path) {
        err = err.with_attribute(path);
    }
    err
}

impl<M: Send + Sync + 'static> Lifecycle<M> {
    /// Validate the provider block and build the client handle
    pub async fn configure<P>(provider: &P, config: &Attributes) -> ProviderResult<Self>
    where
        P: Provider<Meta = M>,
    {
        let schema = provider.schema();
        schema.validate(config).map_err(|errs| validation_error(&errs))?;
        let config = schema.normalize(config);
        let meta = provider.configure(&config).await?;
        log::info!("Configured provider {}", provider.name());
        Ok(Self::with_meta(provider, Arc::new(meta)))
    }

    /// Build from an already configured client handle
    pub fn with_meta<P>(provider: &P, meta: Arc<M>) -> Self
    where
        P: Provider<Meta = M>,
    {
        let resources = provider
            .resource_types()
            .into_iter()
            .map(|r| (r.name(), r))
            .collect();
        let data_sources = provider
            .data_sources()
            .into_iter()
            .map(|d| (d.name(), d))
            .collect();
        Self {
            provider_name: provider.name(),
            meta,
            resources,
            data_sources,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn meta(&self) -> &Arc<M> {
        &self.meta
    }

    fn context(&self) -> Context<M> {
        Context::new(Arc::clone(&self.meta), self.cancel.clone())
    }

    fn resource(&self, kind: &str) -> ProviderResult<&dyn ResourceType<M>> {
        self.resources
            .get(kind)
            .map(|r| r.as_ref())
            .ok_or_else(|| {
                ProviderError::validation(format!(
                    "unknown resource type '{}' for provider {}",
                    kind, self.provider_name
                ))
            })
    }

    fn data_source(&self, kind: &str) -> ProviderResult<&dyn DataSource<M>> {
        self.data_sources
            .get(kind)
            .map(|d| d.as_ref())
            .ok_or_else(|| {
                ProviderError::validation(format!(
                    "unknown data source '{}' for provider {}",
                    kind, self.provider_name
                ))
            })
    }

    pub fn resource_schema(&self, kind: &str) -> ProviderResult<ResourceSchema> {
        Ok(self.resource(kind)?.schema())
    }

    pub fn data_source_schema(&self, kind: &str) -> ProviderResult<ResourceSchema> {
        Ok(self.data_source(kind)?.schema())
    }

    /// Schema catalogue: resources and data sources keyed by kind
    pub fn catalogue(&self) -> serde_json::Value {
        let mut resources: Vec<_> = self.resources.values().collect();
        resources.sort_by_key(|r| r.name());
        let mut data_sources: Vec<_> = self.data_sources.values().collect();
        data_sources.sort_by_key(|d| d.name());
        serde_json::json!({
            "provider": self.provider_name,
            "resources": resources
                .into_iter()
                .map(|r| (r.name().to_string(), r.schema().to_json()))
                .collect::<serde_json::Map<_, _>>(),
            "data_sources": data_sources
                .into_iter()
                .map(|d| (d.name().to_string(), d.schema().to_json()))
                .collect::<serde_json::Map<_, _>>(),
        })
    }

    /// Validate configuration and compute the planned change
    pub fn plan(&self, desired: Option<&Resource>, current: Option<&State>) -> ProviderResult<ResourceDiff> {
        let kind = desired
            .map(|r| r.kind.as_str())
            .or(current.map(|s| s.kind.as_str()))
            .ok_or_else(|| ProviderError::internal("nothing to plan"))?;
        let handler = self.resource(kind)?;
        let schema = handler.schema();

        if let Some(resource) = desired {
            schema
                .validate(&resource.attributes)
                .map_err(|errs| validation_error(&errs))?;
        }

        let mut diff = differ::diff(&schema, desired, current);
        if matches!(diff.action, DiffAction::Create | DiffAction::Update | DiffAction::Replace) {
            handler.customize_diff(&mut diff)?;
        }
        log::debug!("Planned {:?} for {} ({:?})", diff.action, kind, diff.changed_attributes());
        Ok(diff)
    }

    /// Execute a planned change; returns the new state, `None` after a delete
    pub async fn apply(&self, diff: &ResourceDiff, current: Option<&State>) -> Result<Option<State>, ApplyError> {
        let fail = |error: ProviderError, partial: Option<State>| ApplyError { error, partial };
        let handler = self.resource(&diff.kind).map_err(|e| fail(e, current.cloned()))?;

        match diff.action {
            DiffAction::NoChange => Ok(current.cloned()),
            DiffAction::Create => self.create(handler, diff).await.map(Some),
            DiffAction::Update => {
                let state = current.ok_or_else(|| fail(ProviderError::internal("update without prior state"), None))?;
                let mut data = ResourceData::for_update(state, &diff.planned, diff.timeouts.clone());
                log::info!("Updating {}", state.resource_id());
                handler
                    .update(&self.context(), &mut data)
                    .await
                    .map_err(|e| fail(e.for_resource(state.resource_id()), Some(state.clone())))?;
                Ok(self.finish(handler, &data))
            }
            DiffAction::Replace => {
                let state = current.ok_or_else(|| fail(ProviderError::internal("replace without prior state"), None))?;
                self.destroy(state).await.map_err(|e| fail(e, Some(state.clone())))?;
                self.create(handler, diff).await.map(Some)
            }
            DiffAction::Delete => {
                let state = current.ok_or_else(|| fail(ProviderError::internal("delete without prior state"), None))?;
                self.destroy(state).await.map_err(|e| fail(e, Some(state.clone())))?;
                Ok(None)
            }
        }
    }

    async fn create(&self, handler: &dyn ResourceType<M>, diff: &ResourceDiff) -> Result<State, ApplyError> {
        let resource = Resource {
            kind: diff.kind.clone(),
            attributes: diff.planned.clone(),
            timeouts: diff.timeouts.clone(),
        };
        let mut data = ResourceData::from_config(&resource);
        log::info!("Creating {}", diff.kind);

        if let Err(e) = handler.create(&self.context(), &mut data).await {
            let partial = data.to_state();
            if let Some(ref p) = partial {
                log::warn!("{} was created but did not finish provisioning: {}", p.resource_id(), e);
            }
            return Err(ApplyError {
                error: match data.id() {
                    Some(id) => e.for_resource(ResourceId::new(diff.kind.clone(), id)),
                    None => e,
                },
                partial,
            });
        }

        self.finish(handler, &data).ok_or_else(|| ApplyError {
            error: ProviderError::internal(format!("{} was created but no id was recorded", diff.kind)),
            partial: None,
        })
    }

    /// Canonicalise the handler's output into host state
    fn finish(&self, handler: &dyn ResourceType<M>, data: &ResourceData) -> Option<State> {
        let schema = handler.schema();
        data.to_state().map(|mut state| {
            state.attributes = schema.normalize(&state.attributes);
            state
        })
    }

    /// Re-read a stored instance; `None` means it no longer exists (drift)
    pub async fn refresh(&self, state: &State) -> ProviderResult<Option<State>> {
        let handler = self.resource(&state.kind)?;
        let mut data = ResourceData::from_state(state);
        match handler.read(&self.context(), &mut data).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                log::warn!("{} not found, removing from state", state.resource_id());
                return Ok(None);
            }
            Err(e) => return Err(e.for_resource(state.resource_id())),
        }
        let refreshed = self.finish(handler, &data);
        if refreshed.is_none() {
            log::warn!("{} not found, removing from state", state.resource_id());
        }
        Ok(refreshed)
    }

    /// Adopt an existing remote object
    pub async fn import(&self, kind: &str, id: &str) -> ProviderResult<State> {
        let handler = self.resource(kind)?;
        let ctx = self.context();
        let mut data = ResourceData::new(kind);
        data.set_id(id);
        handler.import(&ctx, &mut data).await?;

        let resource_id = data.resource_id();
        handler
            .read(&ctx, &mut data)
            .await
            .map_err(|e| e.for_resource(resource_id.clone()))?;
        self.finish(handler, &data).ok_or_else(|| {
            ProviderError::not_found(format!("cannot import non-existent remote object {resource_id}"))
        })
    }

    /// Delete a stored instance; an already-missing object counts as deleted
    pub async fn destroy(&self, state: &State) -> ProviderResult<()> {
        let handler = self.resource(&state.kind)?;
        let mut data = ResourceData::from_state(state);
        log::info!("Destroying {}", state.resource_id());
        match handler.delete(&self.context(), &mut data).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                log::debug!("{} already gone", state.resource_id());
                Ok(())
            }
            Err(e) => Err(e.for_resource(state.resource_id())),
        }
    }

    /// Evaluate a data source
    pub async fn read_data_source(&self, kind: &str, query: &Attributes) -> ProviderResult<State> {
        let source = self.data_source(kind)?;
        let schema = source.schema();
        schema.validate(query).map_err(|errs| validation_error(&errs))?;

        let resource = Resource {
            kind: kind.to_string(),
            attributes: schema.normalize(query),
            timeouts: Default::default(),
        };
        let mut data = ResourceData::from_config(&resource);
        source.read(&self.context(), &mut data).await?;
        data.to_state()
            .ok_or_else(|| ProviderError::internal(format!("data source {kind} did not set an id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, ErrorKind};
    use crate::resource::Value;
    use crate::schema::{AttributeSchema, AttributeType, Validator};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Cloud {
        objects: Mutex<HashMap<String, Attributes>>,
        fail_wait: Mutex<bool>,
    }

    struct Widget;

    #[async_trait]
    impl ResourceType<Cloud> for Widget {
        fn name(&self) -> &'static str {
            "widget"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("widget")
                .attribute(AttributeSchema::new("name", AttributeType::String).required())
                .attribute(AttributeSchema::new("size", AttributeType::Int).validate(Validator::IntAtLeast(1)))
                .attribute(AttributeSchema::new("zone", AttributeType::String).required().force_new())
                .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        }

        fn customize_diff(&self, diff: &mut ResourceDiff) -> ProviderResult<()> {
            if diff.get_str("name") == Some("forbidden") {
                return Err(ProviderError::validation("name is reserved").with_attribute("name"));
            }
            Ok(())
        }

        async fn create(&self, ctx: &Context<Cloud>, data: &mut ResourceData) -> ProviderResult<()> {
            let id = format!("w-{}", data.get_str("name").unwrap_or_default());
            ctx.meta.objects.lock().unwrap().insert(id.clone(), data.attributes().clone());
            data.set_id(id);
            if *ctx.meta.fail_wait.lock().unwrap() {
                return Err(ProviderError::new(ErrorKind::Timeout, "timeout while waiting"));
            }
            self.read(ctx, data).await
        }

        async fn read(&self, ctx: &Context<Cloud>, data: &mut ResourceData) -> ProviderResult<()> {
            let found = ctx.meta.objects.lock().unwrap().get(data.id_str()).cloned();
            match found {
                Some(attrs) => {
                    for (k, v) in attrs {
                        data.set(k, v);
                    }
                    data.set("status", "active");
                }
                None => data.clear_id(),
            }
            Ok(())
        }

        async fn update(&self, ctx: &Context<Cloud>, data: &mut ResourceData) -> ProviderResult<()> {
            ctx.meta
                .objects
                .lock()
                .unwrap()
                .insert(data.id_str().to_string(), data.attributes().clone());
            self.read(ctx, data).await
        }

        async fn delete(&self, ctx: &Context<Cloud>, data: &mut ResourceData) -> ProviderResult<()> {
            match ctx.meta.objects.lock().unwrap().remove(data.id_str()) {
                Some(_) => Ok(()),
                None => Err(ProviderError::from_status(404, "not found")),
            }
        }
    }

    struct TestProvider;

    impl Provider for TestProvider {
        type Meta = Cloud;

        fn name(&self) -> &'static str {
            "test"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("test")
        }

        fn configure<'a>(&'a self, _config: &'a Attributes) -> BoxFuture<'a, ProviderResult<Cloud>> {
            Box::pin(async { Ok(Cloud::default()) })
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType<Cloud>>> {
            vec![Box::new(Widget)]
        }

        fn data_sources(&self) -> Vec<Box<dyn DataSource<Cloud>>> {
            vec![]
        }
    }

    async fn lifecycle() -> Lifecycle<Cloud> {
        Lifecycle::configure(&TestProvider, &Attributes::new()).await.unwrap()
    }

    fn widget(name: &str, zone: &str) -> Resource {
        Resource::new("widget").with_attribute("name", name).with_attribute("zone", zone)
    }

    #[tokio::test]
    async fn create_refresh_update_destroy() {
        let lc = lifecycle().await;
        let diff = lc.plan(Some(&widget("a", "z1")), None).unwrap();
        let state = lc.apply(&diff, None).await.unwrap().unwrap();
        assert_eq!(state.id, "w-a");
        assert_eq!(state.attributes["status"], Value::from("active"));

        let refreshed = lc.refresh(&state).await.unwrap().unwrap();
        assert_eq!(refreshed, state);

        let desired = widget("a", "z1").with_attribute("size", 3i64);
        let diff = lc.plan(Some(&desired), Some(&refreshed)).unwrap();
        assert_eq!(diff.action, DiffAction::Update);
        let updated = lc.apply(&diff, Some(&refreshed)).await.unwrap().unwrap();
        assert_eq!(updated.attributes["size"], Value::Int(3));

        let diff = lc.plan(None, Some(&updated)).unwrap();
        assert!(lc.apply(&diff, Some(&updated)).await.unwrap().is_none());
        assert!(lc.refresh(&updated).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_of_missing_object_succeeds() {
        let lc = lifecycle().await;
        let state = State::new("widget", "w-ghost", Attributes::new());
        assert!(lc.destroy(&state).await.is_ok());
    }

    #[tokio::test]
    async fn plan_rejects_invalid_configuration() {
        let lc = lifecycle().await;
        let err = lc.plan(Some(&widget("a", "z1").with_attribute("size", 0i64)), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.attribute.as_deref(), Some("size"));

        let err = lc.plan(Some(&widget("forbidden", "z1")), None).unwrap_err();
        assert_eq!(err.message, "name is reserved");

        let err = lc.plan(Some(&Resource::new("gizmo")), None).unwrap_err();
        assert!(err.message.contains("unknown resource type 'gizmo'"));
    }

    #[tokio::test]
    async fn force_new_replaces() {
        let lc = lifecycle().await;
        let diff = lc.plan(Some(&widget("a", "z1")), None).unwrap();
        let state = lc.apply(&diff, None).await.unwrap().unwrap();

        let diff = lc.plan(Some(&widget("a", "z2")), Some(&state)).unwrap();
        assert_eq!(diff.action, DiffAction::Replace);
        let replaced = lc.apply(&diff, Some(&state)).await.unwrap().unwrap();
        assert_eq!(replaced.attributes["zone"], Value::from("z2"));
    }

    #[tokio::test]
    async fn failed_create_returns_partial_state() {
        let lc = lifecycle().await;
        *lc.meta().fail_wait.lock().unwrap() = true;
        let diff = lc.plan(Some(&widget("slow", "z1")), None).unwrap();
        let err = lc.apply(&diff, None).await.unwrap_err();
        assert_eq!(err.error.kind, ErrorKind::Timeout);
        assert_eq!(err.partial.map(|s| s.id), Some("w-slow".to_string()));
    }

    #[tokio::test]
    async fn import_reads_existing_object() {
        let lc = lifecycle().await;
        let diff = lc.plan(Some(&widget("b", "z1")), None).unwrap();
        lc.apply(&diff, None).await.unwrap();

        let imported = lc.import("widget", "w-b").await.unwrap();
        assert_eq!(imported.attributes["name"], Value::from("b"));

        let err = lc.import("widget", "w-missing").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn catalogue_lists_resources() {
        let lc = lifecycle().await;
        let catalogue = lc.catalogue();
        assert_eq!(catalogue["resources"]["widget"]["attributes"]["zone"]["force_new"], true);
    }
}
