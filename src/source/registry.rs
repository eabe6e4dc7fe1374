//! Capability-based backend registry.
//!
//! Backends register as [`BackendBuilder`]s; at open time every builder is
//! probed in registration order and the first one claiming the locator opens
//! it. Reopening from a persisted [`SourceDescriptor`] bypasses probing and
//! looks the builder up by its tag.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::error::OpenError;
use crate::source::backend::BackendBuilder;
use crate::source::descriptor::SourceDescriptor;
use crate::source::image_file::ImageFileBuilder;
use crate::source::{OpenOptions, Source};

/// Ordered set of registered backend builders.
pub struct BackendRegistry {
    builders: Vec<Arc<dyn BackendBuilder>>,
}

impl BackendRegistry {
    /// Registry with the built-in backends (currently the flat-image
    /// backend for png/jpeg files).
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ImageFileBuilder));
        registry
    }

    /// Registry with no backends. Tests and embedders register their own.
    pub fn empty() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// Add a builder. Probing order is registration order, so more specific
    /// backends should be registered before catch-alls.
    pub fn register(&mut self, builder: Arc<dyn BackendBuilder>) {
        self.builders.push(builder);
    }

    /// Registered backend tags, in probing order.
    pub fn tags(&self) -> Vec<&'static str> {
        self.builders.iter().map(|b| b.tag()).collect()
    }

    /// Open a source by locator: probe builders and open with the first
    /// claimant. Fails with [`OpenError::UnsupportedSource`] when nothing
    /// claims the locator.
    pub async fn open(
        &self,
        locator: &str,
        args: BTreeMap<String, String>,
        options: OpenOptions,
    ) -> Result<Source, OpenError> {
        let builder = self
            .builders
            .iter()
            .find(|builder| builder.claims(locator))
            .ok_or_else(|| OpenError::UnsupportedSource {
                locator: locator.to_string(),
            })?;
        self.open_with(builder, locator, args, options).await
    }

    /// Reopen a source from a persisted descriptor.
    pub async fn open_descriptor(
        &self,
        descriptor: &SourceDescriptor,
        options: OpenOptions,
    ) -> Result<Source, OpenError> {
        let builder = self
            .builders
            .iter()
            .find(|builder| builder.tag() == descriptor.backend)
            .ok_or_else(|| OpenError::UnknownBackend {
                tag: descriptor.backend.clone(),
            })?;
        self.open_with(builder, &descriptor.locator, descriptor.args.clone(), options)
            .await
    }

    async fn open_with(
        &self,
        builder: &Arc<dyn BackendBuilder>,
        locator: &str,
        args: BTreeMap<String, String>,
        options: OpenOptions,
    ) -> Result<Source, OpenError> {
        let backend = builder.open(locator, &args).await?;
        backend.metadata().validate()?;

        let descriptor = SourceDescriptor {
            backend: builder.tag().to_string(),
            locator: locator.to_string(),
            args,
        };
        info!(
            backend = builder.tag(),
            locator,
            width = backend.metadata().width,
            height = backend.metadata().height,
            levels = backend.metadata().levels.len(),
            "opened source"
        );
        Ok(Source::new(descriptor, Arc::from(backend), options))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
