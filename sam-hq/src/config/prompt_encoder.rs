//! Prompt encoder configuration.

use std::fmt;

use burn::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{enums::Activation, mapping::check_extra, ConfigMapping};
use crate::error::{ensure, ensure_positive, SamHqError, SamHqResult};

/// Configuration of the module that encodes points, boxes and mask prompts.
///
/// `image_embedding_size` is derived as `image_size / patch_size` when the
/// record is built and cannot be set on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SamHqPromptEncoderConfigBuilder")]
pub struct SamHqPromptEncoderConfig {
    hidden_size: usize,
    image_size: usize,
    patch_size: usize,
    image_embedding_size: usize,
    mask_input_channels: usize,
    num_point_embeddings: usize,
    hidden_act: Activation,
    layer_norm_eps: f64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SamHqPromptEncoderConfig {
    /// A configuration with every field at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> SamHqPromptEncoderConfigBuilder {
        SamHqPromptEncoderConfigBuilder::default()
    }

    /// Re-opens the record for modification. The derived field is recomputed on `build()`.
    #[must_use]
    pub fn into_builder(self) -> SamHqPromptEncoderConfigBuilder {
        SamHqPromptEncoderConfigBuilder {
            hidden_size: self.hidden_size,
            image_size: self.image_size,
            patch_size: self.patch_size,
            image_embedding_size: None,
            mask_input_channels: self.mask_input_channels,
            num_point_embeddings: self.num_point_embeddings,
            hidden_act: self.hidden_act,
            layer_norm_eps: self.layer_norm_eps,
            extra: self.extra,
        }
    }

    /// Width of the prompt embeddings.
    #[must_use]
    pub const fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    #[must_use]
    pub const fn image_size(&self) -> usize {
        self.image_size
    }

    #[must_use]
    pub const fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Side length of the image embedding grid, `image_size / patch_size`.
    #[must_use]
    pub const fn image_embedding_size(&self) -> usize {
        self.image_embedding_size
    }

    #[must_use]
    pub const fn mask_input_channels(&self) -> usize {
        self.mask_input_channels
    }

    #[must_use]
    pub const fn num_point_embeddings(&self) -> usize {
        self.num_point_embeddings
    }

    #[must_use]
    pub const fn hidden_act(&self) -> Activation {
        self.hidden_act
    }

    #[must_use]
    pub const fn layer_norm_eps(&self) -> f64 {
        self.layer_norm_eps
    }

    /// Keys this record does not recognize, kept verbatim.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl Default for SamHqPromptEncoderConfig {
    fn default() -> Self {
        SamHqPromptEncoderConfigBuilder::default().resolve()
    }
}

/// Builder for [`SamHqPromptEncoderConfig`], also the target every mapping is decoded into.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamHqPromptEncoderConfigBuilder {
    hidden_size: usize,
    image_size: usize,
    patch_size: usize,
    /// Derived; a supplied value is discarded at build time.
    image_embedding_size: Option<usize>,
    mask_input_channels: usize,
    num_point_embeddings: usize,
    hidden_act: Activation,
    layer_norm_eps: f64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for SamHqPromptEncoderConfigBuilder {
    fn default() -> Self {
        Self {
            hidden_size: 256,
            image_size: 1024,
            patch_size: 16,
            image_embedding_size: None,
            mask_input_channels: 16,
            num_point_embeddings: 4,
            hidden_act: Activation::Gelu,
            layer_norm_eps: 1e-6,
            extra: Map::new(),
        }
    }
}

impl SamHqPromptEncoderConfigBuilder {
    builder_setters! {
        with_hidden_size => hidden_size: usize,
        with_image_size => image_size: usize,
        with_patch_size => patch_size: usize,
        with_mask_input_channels => mask_input_channels: usize,
        with_num_point_embeddings => num_point_embeddings: usize,
        with_hidden_act => hidden_act: Activation,
        with_layer_norm_eps => layer_norm_eps: f64,
    }

    /// Adds an opaque metadata entry carried alongside the typed fields.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Validates the fields and derives `image_embedding_size`.
    ///
    /// # Errors
    ///
    /// Returns `Err(SamHqError::InvalidConfiguration)` naming the offending field
    /// when `patch_size` is zero, `layer_norm_eps` is not a positive number, or an
    /// extra key shadows a typed field.
    pub fn build(self) -> SamHqResult<SamHqPromptEncoderConfig> {
        ensure(self.patch_size > 0, "patch_size", self.patch_size, "must be positive")?;
        ensure_positive("layer_norm_eps", self.layer_norm_eps)?;
        check_extra(&self.extra, SamHqPromptEncoderConfig::FIELDS)?;
        Ok(self.resolve())
    }

    /// Derives `image_embedding_size`; `patch_size` must already be non-zero.
    fn resolve(self) -> SamHqPromptEncoderConfig {
        let image_embedding_size = self.image_size / self.patch_size;
        if let Some(supplied) = self
            .image_embedding_size
            .filter(|&supplied| supplied != image_embedding_size)
        {
            tracing::debug!(
                supplied,
                derived = image_embedding_size,
                "discarding stale image_embedding_size"
            );
        }

        SamHqPromptEncoderConfig {
            hidden_size: self.hidden_size,
            image_size: self.image_size,
            patch_size: self.patch_size,
            image_embedding_size,
            mask_input_channels: self.mask_input_channels,
            num_point_embeddings: self.num_point_embeddings,
            hidden_act: self.hidden_act,
            layer_norm_eps: self.layer_norm_eps,
            extra: self.extra,
        }
    }
}

impl TryFrom<SamHqPromptEncoderConfigBuilder> for SamHqPromptEncoderConfig {
    type Error = SamHqError;

    fn try_from(builder: SamHqPromptEncoderConfigBuilder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl Config for SamHqPromptEncoderConfig {}

impl ConfigMapping for SamHqPromptEncoderConfig {
    type Builder = SamHqPromptEncoderConfigBuilder;

    const FIELDS: &'static [&'static str] = &[
        "hidden_size",
        "image_size",
        "patch_size",
        "image_embedding_size",
        "mask_input_channels",
        "num_point_embeddings",
        "hidden_act",
        "layer_norm_eps",
    ];

    fn from_builder(builder: Self::Builder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl fmt::Display for SamHqPromptEncoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
