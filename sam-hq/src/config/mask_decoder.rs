//! Mask decoder configuration.

use std::fmt;

use burn::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{enums::Activation, mapping::check_extra, ConfigMapping};
use crate::error::{ensure, ensure_positive, SamHqError, SamHqResult};

/// Configuration of the two-way transformer that decodes embeddings into masks,
/// together with its IoU quality-score head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SamHqMaskDecoderConfigBuilder")]
pub struct SamHqMaskDecoderConfig {
    hidden_size: usize,
    hidden_act: Activation,
    mlp_dim: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
    attention_downsample_rate: usize,
    num_multimask_outputs: usize,
    iou_head_depth: usize,
    iou_head_hidden_dim: usize,
    layer_norm_eps: f64,
    vision_encoder_dim: usize,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SamHqMaskDecoderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> SamHqMaskDecoderConfigBuilder {
        SamHqMaskDecoderConfigBuilder::default()
    }

    #[must_use]
    pub fn into_builder(self) -> SamHqMaskDecoderConfigBuilder {
        SamHqMaskDecoderConfigBuilder {
            hidden_size: self.hidden_size,
            hidden_act: self.hidden_act,
            mlp_dim: self.mlp_dim,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            attention_downsample_rate: Some(self.attention_downsample_rate),
            legacy_attention_downsample_rate: None,
            num_multimask_outputs: self.num_multimask_outputs,
            iou_head_depth: self.iou_head_depth,
            iou_head_hidden_dim: self.iou_head_hidden_dim,
            layer_norm_eps: self.layer_norm_eps,
            vision_encoder_dim: self.vision_encoder_dim,
            extra: self.extra,
        }
    }

    #[must_use]
    pub const fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    #[must_use]
    pub const fn hidden_act(&self) -> Activation {
        self.hidden_act
    }

    /// Width of the transformer feed-forward layers.
    #[must_use]
    pub const fn mlp_dim(&self) -> usize {
        self.mlp_dim
    }

    #[must_use]
    pub const fn num_hidden_layers(&self) -> usize {
        self.num_hidden_layers
    }

    #[must_use]
    pub const fn num_attention_heads(&self) -> usize {
        self.num_attention_heads
    }

    #[must_use]
    pub const fn attention_downsample_rate(&self) -> usize {
        self.attention_downsample_rate
    }

    #[must_use]
    pub const fn num_multimask_outputs(&self) -> usize {
        self.num_multimask_outputs
    }

    #[must_use]
    pub const fn iou_head_depth(&self) -> usize {
        self.iou_head_depth
    }

    #[must_use]
    pub const fn iou_head_hidden_dim(&self) -> usize {
        self.iou_head_hidden_dim
    }

    #[must_use]
    pub const fn layer_norm_eps(&self) -> f64 {
        self.layer_norm_eps
    }

    /// Width of the vision encoder features fed into the HQ output token path.
    /// Should equal the paired vision config's `hidden_size`.
    #[must_use]
    pub const fn vision_encoder_dim(&self) -> usize {
        self.vision_encoder_dim
    }

    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Per-head width of the self-attention layers.
    #[must_use]
    pub const fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Internal width of the downsampled token-to-image cross-attention.
    #[must_use]
    pub const fn downsampled_dim(&self) -> usize {
        self.hidden_size / self.attention_downsample_rate
    }
}

impl Default for SamHqMaskDecoderConfig {
    fn default() -> Self {
        SamHqMaskDecoderConfigBuilder::default().resolve()
    }
}

/// Builder for [`SamHqMaskDecoderConfig`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamHqMaskDecoderConfigBuilder {
    hidden_size: usize,
    hidden_act: Activation,
    mlp_dim: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
    attention_downsample_rate: Option<usize>,
    /// Misspelled key written by older checkpoints; must agree with the canonical key if both are given.
    #[serde(rename = "attention_downsam_hqple_rate")]
    legacy_attention_downsample_rate: Option<usize>,
    num_multimask_outputs: usize,
    iou_head_depth: usize,
    iou_head_hidden_dim: usize,
    layer_norm_eps: f64,
    vision_encoder_dim: usize,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for SamHqMaskDecoderConfigBuilder {
    fn default() -> Self {
        Self {
            hidden_size: 256,
            hidden_act: Activation::Relu,
            mlp_dim: 2048,
            num_hidden_layers: 2,
            num_attention_heads: 8,
            attention_downsample_rate: None,
            legacy_attention_downsample_rate: None,
            num_multimask_outputs: 3,
            iou_head_depth: 3,
            iou_head_hidden_dim: 256,
            layer_norm_eps: 1e-6,
            vision_encoder_dim: 768,
            extra: Map::new(),
        }
    }
}

impl SamHqMaskDecoderConfigBuilder {
    builder_setters! {
        with_hidden_size => hidden_size: usize,
        with_hidden_act => hidden_act: Activation,
        with_mlp_dim => mlp_dim: usize,
        with_num_hidden_layers => num_hidden_layers: usize,
        with_num_attention_heads => num_attention_heads: usize,
        with_num_multimask_outputs => num_multimask_outputs: usize,
        with_iou_head_depth => iou_head_depth: usize,
        with_iou_head_hidden_dim => iou_head_hidden_dim: usize,
        with_layer_norm_eps => layer_norm_eps: f64,
        with_vision_encoder_dim => vision_encoder_dim: usize,
    }

    #[must_use]
    pub fn with_attention_downsample_rate(mut self, attention_downsample_rate: usize) -> Self {
        self.attention_downsample_rate = Some(attention_downsample_rate);
        self
    }

    fn downsample_rate(&self) -> usize {
        self.attention_downsample_rate
            .or(self.legacy_attention_downsample_rate)
            .unwrap_or(2)
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Validate the fields and produce the record.
    ///
    /// # Errors
    ///
    /// Returns `Err(SamHqError::InvalidConfiguration)` if the attention heads do not
    /// split `hidden_size` (or its downsampled width) evenly, if there are no
    /// multimask outputs or IoU head layers, if `layer_norm_eps` is not positive,
    /// if the legacy downsample key disagrees with `attention_downsample_rate`,
    /// or if an extra key shadows a typed field.
    pub fn build(self) -> SamHqResult<SamHqMaskDecoderConfig> {
        let heads = self.num_attention_heads;
        ensure(heads > 0, "num_attention_heads", heads, "must be positive")?;
        ensure(
            self.hidden_size % heads == 0,
            "num_attention_heads",
            heads,
            &format!("must evenly divide hidden_size ({})", self.hidden_size),
        )?;

        if let (Some(rate), Some(legacy)) = (
            self.attention_downsample_rate,
            self.legacy_attention_downsample_rate,
        ) {
            ensure(
                rate == legacy,
                "attention_downsam_hqple_rate",
                legacy,
                &format!("conflicts with attention_downsample_rate ({rate})"),
            )?;
        }

        let rate = self.downsample_rate();
        ensure(rate > 0, "attention_downsample_rate", rate, "must be positive")?;
        let downsampled = self.hidden_size / rate;
        ensure(
            downsampled > 0 && downsampled % heads == 0,
            "attention_downsample_rate",
            rate,
            &format!(
                "hidden_size / attention_downsample_rate ({downsampled}) must be a positive multiple of num_attention_heads ({heads})"
            ),
        )?;

        ensure(
            self.num_multimask_outputs >= 1,
            "num_multimask_outputs",
            self.num_multimask_outputs,
            "must be at least 1",
        )?;
        ensure(
            self.iou_head_depth >= 1,
            "iou_head_depth",
            self.iou_head_depth,
            "must be at least 1",
        )?;
        ensure_positive("layer_norm_eps", self.layer_norm_eps)?;
        check_extra(&self.extra, SamHqMaskDecoderConfig::FIELDS)?;

        Ok(self.resolve())
    }

    pub(crate) fn resolve(self) -> SamHqMaskDecoderConfig {
        let attention_downsample_rate = self.downsample_rate();
        SamHqMaskDecoderConfig {
            hidden_size: self.hidden_size,
            hidden_act: self.hidden_act,
            mlp_dim: self.mlp_dim,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            attention_downsample_rate,
            num_multimask_outputs: self.num_multimask_outputs,
            iou_head_depth: self.iou_head_depth,
            iou_head_hidden_dim: self.iou_head_hidden_dim,
            layer_norm_eps: self.layer_norm_eps,
            vision_encoder_dim: self.vision_encoder_dim,
            extra: self.extra,
        }
    }
}

impl TryFrom<SamHqMaskDecoderConfigBuilder> for SamHqMaskDecoderConfig {
    type Error = SamHqError;

    fn try_from(builder: SamHqMaskDecoderConfigBuilder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl Config for SamHqMaskDecoderConfig {}

impl ConfigMapping for SamHqMaskDecoderConfig {
    type Builder = SamHqMaskDecoderConfigBuilder;

    const FIELDS: &'static [&'static str] = &[
        "hidden_size",
        "hidden_act",
        "mlp_dim",
        "num_hidden_layers",
        "num_attention_heads",
        "attention_downsample_rate",
        "attention_downsam_hqple_rate",
        "num_multimask_outputs",
        "iou_head_depth",
        "iou_head_hidden_dim",
        "layer_norm_eps",
        "vision_encoder_dim",
    ];

    fn from_builder(builder: Self::Builder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl fmt::Display for SamHqMaskDecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
