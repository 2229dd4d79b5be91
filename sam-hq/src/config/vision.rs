//! Vision encoder configuration.
//!
//! The encoder is a plain ViT over non-overlapping patches. Most blocks attend
//! within local windows of `window_size` patches; the blocks listed in
//! `global_attn_indexes` attend over the whole patch grid instead.

use std::fmt;

use burn::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    enums::{Activation, SamHqVariant},
    mapping::check_extra,
    ConfigMapping,
};
use crate::error::{ensure, ensure_positive, SamHqError, SamHqResult};

/// Configuration of the windowed-attention ViT image encoder.
///
/// `mlp_dim` is derived as `hidden_size * mlp_ratio` (truncated) unless given
/// explicitly; an explicit value wins and `mlp_ratio` is then kept for reference only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SamHqVisionConfigBuilder")]
pub struct SamHqVisionConfig {
    hidden_size: usize,
    output_channels: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
    num_channels: usize,
    image_size: usize,
    patch_size: usize,
    hidden_act: Activation,
    layer_norm_eps: f64,
    attention_dropout: f64,
    initializer_range: f64,
    qkv_bias: bool,
    mlp_ratio: f64,
    use_abs_pos: bool,
    use_rel_pos: bool,
    window_size: usize,
    global_attn_indexes: Vec<usize>,
    num_pos_feats: usize,
    mlp_dim: usize,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SamHqVisionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> SamHqVisionConfigBuilder {
        SamHqVisionConfigBuilder::default()
    }

    /// The vision encoder of a published checkpoint.
    #[must_use]
    pub fn from_variant(variant: SamHqVariant) -> Self {
        Self::builder()
            .with_hidden_size(variant.hidden_size())
            .with_num_hidden_layers(variant.num_hidden_layers())
            .with_num_attention_heads(variant.num_attention_heads())
            .with_global_attn_indexes(variant.global_attn_indexes().to_vec())
            .resolve()
    }

    /// Re-opens the record for modification.
    ///
    /// The resolved `mlp_dim` is carried over as explicit, the same way a flat
    /// mapping round trip keeps it. Call `without_mlp_dim()` on the builder to
    /// have it derived from `mlp_ratio` again.
    #[must_use]
    pub fn into_builder(self) -> SamHqVisionConfigBuilder {
        SamHqVisionConfigBuilder {
            hidden_size: self.hidden_size,
            output_channels: self.output_channels,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            num_channels: self.num_channels,
            image_size: self.image_size,
            patch_size: self.patch_size,
            hidden_act: self.hidden_act,
            layer_norm_eps: self.layer_norm_eps,
            attention_dropout: self.attention_dropout,
            initializer_range: self.initializer_range,
            qkv_bias: self.qkv_bias,
            mlp_ratio: self.mlp_ratio,
            use_abs_pos: self.use_abs_pos,
            use_rel_pos: self.use_rel_pos,
            window_size: self.window_size,
            global_attn_indexes: self.global_attn_indexes,
            num_pos_feats: self.num_pos_feats,
            mlp_dim: Some(self.mlp_dim),
            extra: self.extra,
        }
    }

    /// Dimensionality of the encoder layers.
    #[must_use]
    pub const fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Channels of the neck that projects encoder features for the mask decoder.
    #[must_use]
    pub const fn output_channels(&self) -> usize {
        self.output_channels
    }

    #[must_use]
    pub const fn num_hidden_layers(&self) -> usize {
        self.num_hidden_layers
    }

    #[must_use]
    pub const fn num_attention_heads(&self) -> usize {
        self.num_attention_heads
    }

    /// Channels of the input image, 3 for RGB.
    #[must_use]
    pub const fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[must_use]
    pub const fn image_size(&self) -> usize {
        self.image_size
    }

    #[must_use]
    pub const fn patch_size(&self) -> usize {
        self.patch_size
    }

    #[must_use]
    pub const fn hidden_act(&self) -> Activation {
        self.hidden_act
    }

    #[must_use]
    pub const fn layer_norm_eps(&self) -> f64 {
        self.layer_norm_eps
    }

    #[must_use]
    pub const fn attention_dropout(&self) -> f64 {
        self.attention_dropout
    }

    /// Standard deviation of the truncated normal weight initializer.
    #[must_use]
    pub const fn initializer_range(&self) -> f64 {
        self.initializer_range
    }

    #[must_use]
    pub const fn qkv_bias(&self) -> bool {
        self.qkv_bias
    }

    #[must_use]
    pub const fn mlp_ratio(&self) -> f64 {
        self.mlp_ratio
    }

    #[must_use]
    pub const fn use_abs_pos(&self) -> bool {
        self.use_abs_pos
    }

    #[must_use]
    pub const fn use_rel_pos(&self) -> bool {
        self.use_rel_pos
    }

    /// Side length of the local attention windows, in patches. Zero disables windowing.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub fn global_attn_indexes(&self) -> &[usize] {
        &self.global_attn_indexes
    }

    #[must_use]
    pub const fn num_pos_feats(&self) -> usize {
        self.num_pos_feats
    }

    /// Width of the feed-forward layers, explicit or derived from `mlp_ratio`.
    #[must_use]
    pub const fn mlp_dim(&self) -> usize {
        self.mlp_dim
    }

    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    #[must_use]
    pub const fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Side length of the patch grid, `image_size / patch_size`.
    #[must_use]
    pub const fn grid_size(&self) -> usize {
        self.image_size / self.patch_size
    }

    /// Whether block `index` attends over the full grid rather than a window.
    #[must_use]
    pub fn is_global_attention_layer(&self, index: usize) -> bool {
        self.global_attn_indexes.contains(&index)
    }
}

impl Default for SamHqVisionConfig {
    fn default() -> Self {
        SamHqVisionConfigBuilder::default().resolve()
    }
}

/// Builder for [`SamHqVisionConfig`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamHqVisionConfigBuilder {
    hidden_size: usize,
    output_channels: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
    num_channels: usize,
    image_size: usize,
    patch_size: usize,
    hidden_act: Activation,
    layer_norm_eps: f64,
    attention_dropout: f64,
    initializer_range: f64,
    qkv_bias: bool,
    mlp_ratio: f64,
    use_abs_pos: bool,
    use_rel_pos: bool,
    window_size: usize,
    global_attn_indexes: Vec<usize>,
    num_pos_feats: usize,
    mlp_dim: Option<usize>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for SamHqVisionConfigBuilder {
    fn default() -> Self {
        Self {
            hidden_size: 768,
            output_channels: 256,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            num_channels: 3,
            image_size: 1024,
            patch_size: 16,
            hidden_act: Activation::Gelu,
            layer_norm_eps: 1e-6,
            attention_dropout: 0.0,
            initializer_range: 1e-10,
            qkv_bias: true,
            mlp_ratio: 4.0,
            use_abs_pos: true,
            use_rel_pos: true,
            window_size: 14,
            global_attn_indexes: vec![2, 5, 8, 11],
            num_pos_feats: 128,
            mlp_dim: None,
            extra: Map::new(),
        }
    }
}

impl SamHqVisionConfigBuilder {
    builder_setters! {
        with_hidden_size => hidden_size: usize,
        with_output_channels => output_channels: usize,
        with_num_hidden_layers => num_hidden_layers: usize,
        with_num_attention_heads => num_attention_heads: usize,
        with_num_channels => num_channels: usize,
        with_image_size => image_size: usize,
        with_patch_size => patch_size: usize,
        with_hidden_act => hidden_act: Activation,
        with_layer_norm_eps => layer_norm_eps: f64,
        with_attention_dropout => attention_dropout: f64,
        with_initializer_range => initializer_range: f64,
        with_qkv_bias => qkv_bias: bool,
        with_mlp_ratio => mlp_ratio: f64,
        with_use_abs_pos => use_abs_pos: bool,
        with_use_rel_pos => use_rel_pos: bool,
        with_window_size => window_size: usize,
        with_global_attn_indexes => global_attn_indexes: Vec<usize>,
        with_num_pos_feats => num_pos_feats: usize,
    }

    /// Sets an explicit `mlp_dim`, overriding the `mlp_ratio` derivation.
    #[must_use]
    pub fn with_mlp_dim(mut self, mlp_dim: usize) -> Self {
        self.mlp_dim = Some(mlp_dim);
        self
    }

    /// Clears an explicit `mlp_dim` so it is derived from `mlp_ratio` on build.
    #[must_use]
    pub fn without_mlp_dim(mut self) -> Self {
        self.mlp_dim = None;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Validate the fields, derive `mlp_dim` if unset, and produce the record.
    ///
    /// # Errors
    ///
    /// Returns `Err(SamHqError::InvalidConfiguration)` naming the offending field when:
    /// - `patch_size` is zero
    /// - `num_attention_heads` is zero or does not divide `hidden_size`
    /// - `attention_dropout` is outside `[0, 1)`
    /// - `initializer_range`, `mlp_ratio` or `layer_norm_eps` is not a positive number
    /// - `mlp_dim` is unset and `hidden_size * mlp_ratio` does not fit in `usize`
    /// - a `global_attn_indexes` entry is not below `num_hidden_layers`
    /// - an extra key shadows a typed field
    pub fn build(self) -> SamHqResult<SamHqVisionConfig> {
        ensure(self.patch_size > 0, "patch_size", self.patch_size, "must be positive")?;

        let heads = self.num_attention_heads;
        ensure(heads > 0, "num_attention_heads", heads, "must be positive")?;
        ensure(
            self.hidden_size % heads == 0,
            "num_attention_heads",
            heads,
            &format!("must evenly divide hidden_size ({})", self.hidden_size),
        )?;

        ensure(
            (0.0..1.0).contains(&self.attention_dropout),
            "attention_dropout",
            self.attention_dropout,
            "must lie in [0, 1)",
        )?;
        ensure_positive("initializer_range", self.initializer_range)?;
        ensure_positive("mlp_ratio", self.mlp_ratio)?;
        if self.mlp_dim.is_none() {
            let derived = self.hidden_size as f64 * self.mlp_ratio;
            ensure(
                derived.is_finite() && derived < usize::MAX as f64,
                "mlp_ratio",
                self.mlp_ratio,
                &format!(
                    "hidden_size ({}) * mlp_ratio overflows the derived mlp_dim",
                    self.hidden_size
                ),
            )?;
        }
        ensure_positive("layer_norm_eps", self.layer_norm_eps)?;

        if let Some(&index) = self
            .global_attn_indexes
            .iter()
            .find(|&&index| index >= self.num_hidden_layers)
        {
            return Err(SamHqError::invalid(
                "global_attn_indexes",
                format!("{:?}", self.global_attn_indexes),
                format!(
                    "layer index {index} is out of range for num_hidden_layers ({})",
                    self.num_hidden_layers
                ),
            ));
        }

        check_extra(&self.extra, SamHqVisionConfig::FIELDS)?;
        Ok(self.resolve())
    }

    pub(crate) fn resolve(self) -> SamHqVisionConfig {
        // Truncates toward zero. `build()` has already ruled out overflow.
        let mlp_dim = self
            .mlp_dim
            .unwrap_or_else(|| (self.hidden_size as f64 * self.mlp_ratio) as usize);

        SamHqVisionConfig {
            hidden_size: self.hidden_size,
            output_channels: self.output_channels,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            num_channels: self.num_channels,
            image_size: self.image_size,
            patch_size: self.patch_size,
            hidden_act: self.hidden_act,
            layer_norm_eps: self.layer_norm_eps,
            attention_dropout: self.attention_dropout,
            initializer_range: self.initializer_range,
            qkv_bias: self.qkv_bias,
            mlp_ratio: self.mlp_ratio,
            use_abs_pos: self.use_abs_pos,
            use_rel_pos: self.use_rel_pos,
            window_size: self.window_size,
            global_attn_indexes: self.global_attn_indexes,
            num_pos_feats: self.num_pos_feats,
            mlp_dim,
            extra: self.extra,
        }
    }
}

impl TryFrom<SamHqVisionConfigBuilder> for SamHqVisionConfig {
    type Error = SamHqError;

    fn try_from(builder: SamHqVisionConfigBuilder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl Config for SamHqVisionConfig {}

impl ConfigMapping for SamHqVisionConfig {
    type Builder = SamHqVisionConfigBuilder;

    const FIELDS: &'static [&'static str] = &[
        "hidden_size",
        "output_channels",
        "num_hidden_layers",
        "num_attention_heads",
        "num_channels",
        "image_size",
        "patch_size",
        "hidden_act",
        "layer_norm_eps",
        "attention_dropout",
        "initializer_range",
        "qkv_bias",
        "mlp_ratio",
        "use_abs_pos",
        "use_rel_pos",
        "window_size",
        "global_attn_indexes",
        "num_pos_feats",
        "mlp_dim",
    ];

    fn from_builder(builder: Self::Builder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl fmt::Display for SamHqVisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_match_published_checkpoint() {
        let config = SamHqVisionConfig::new();
        assert_eq!(config.hidden_size(), 768);
        assert_eq!(config.output_channels(), 256);
        assert_eq!(config.num_hidden_layers(), 12);
        assert_eq!(config.num_attention_heads(), 12);
        assert_eq!(config.num_channels(), 3);
        assert_eq!(config.image_size(), 1024);
        assert_eq!(config.patch_size(), 16);
        assert_eq!(config.hidden_act(), Activation::Gelu);
        assert_eq!(config.attention_dropout(), 0.0);
        assert_eq!(config.initializer_range(), 1e-10);
        assert!(config.qkv_bias());
        assert!(config.use_abs_pos());
        assert!(config.use_rel_pos());
        assert_eq!(config.window_size(), 14);
        assert_eq!(config.global_attn_indexes(), &[2, 5, 8, 11]);
        assert_eq!(config.num_pos_feats(), 128);
        assert_eq!(config.mlp_dim(), 3072);
        assert_eq!(config.head_dim(), 64);
        assert_eq!(config.grid_size(), 64);
    }

    #[test]
    fn mlp_dim_is_derived_by_truncation() {
        let config = SamHqVisionConfig::builder()
            .with_hidden_size(100)
            .with_num_attention_heads(10)
            .with_mlp_ratio(2.675)
            .build()
            .unwrap();
        assert_eq!(config.mlp_dim(), (100.0_f64 * 2.675) as usize);
        assert_eq!(config.mlp_dim(), 267);
    }

    #[test]
    fn explicit_mlp_dim_overrides_ratio() {
        let config = SamHqVisionConfig::builder()
            .with_hidden_size(768)
            .with_mlp_ratio(4.0)
            .with_mlp_dim(1000)
            .build()
            .unwrap();
        assert_eq!(config.mlp_dim(), 1000);
        assert_eq!(config.mlp_ratio(), 4.0);
    }

    #[test]
    fn into_builder_keeps_resolved_mlp_dim_until_cleared() {
        let config = SamHqVisionConfig::new();

        let kept = config
            .clone()
            .into_builder()
            .with_hidden_size(1024)
            .with_num_attention_heads(16)
            .build()
            .unwrap();
        assert_eq!(kept.mlp_dim(), 3072);

        let rederived = config
            .into_builder()
            .with_hidden_size(1024)
            .with_num_attention_heads(16)
            .without_mlp_dim()
            .build()
            .unwrap();
        assert_eq!(rederived.mlp_dim(), 4096);
    }

    #[test]
    fn default_global_attn_indexes_are_independent() {
        let first = SamHqVisionConfig::new();
        let second = SamHqVisionConfig::new();

        let mut indexes = first.global_attn_indexes().to_vec();
        indexes.push(3);
        let modified = first
            .into_builder()
            .with_global_attn_indexes(indexes)
            .build()
            .unwrap();

        assert_eq!(modified.global_attn_indexes(), &[2, 5, 8, 11, 3]);
        assert_eq!(second.global_attn_indexes(), &[2, 5, 8, 11]);
        assert_eq!(SamHqVisionConfig::new().global_attn_indexes(), &[2, 5, 8, 11]);
    }

    #[test]
    fn out_of_range_global_layer_is_rejected() {
        let result = SamHqVisionConfig::builder().with_num_hidden_layers(6).build();
        match result {
            Err(SamHqError::InvalidConfiguration { field, value, reason }) => {
                assert_eq!(field, "global_attn_indexes");
                assert_eq!(value, "[2, 5, 8, 11]");
                assert!(reason.contains("layer index 8"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn invalid_scalars_are_rejected() {
        let cases = [
            ("patch_size", SamHqVisionConfig::builder().with_patch_size(0)),
            (
                "num_attention_heads",
                SamHqVisionConfig::builder().with_num_attention_heads(5),
            ),
            (
                "attention_dropout",
                SamHqVisionConfig::builder().with_attention_dropout(1.0),
            ),
            (
                "initializer_range",
                SamHqVisionConfig::builder().with_initializer_range(0.0),
            ),
            ("mlp_ratio", SamHqVisionConfig::builder().with_mlp_ratio(-1.0)),
        ];

        for (expected, builder) in cases {
            match builder.build() {
                Err(SamHqError::InvalidConfiguration { field, .. }) => assert_eq!(field, expected),
                other => panic!("Expected InvalidConfiguration for {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn overflowing_mlp_ratio_is_rejected() {
        match SamHqVisionConfig::builder().with_mlp_ratio(1e300).build() {
            Err(SamHqError::InvalidConfiguration { field, value, reason }) => {
                assert_eq!(field, "mlp_ratio");
                assert_eq!(value, 1e300_f64.to_string());
                assert!(reason.contains("overflows"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }

        // An explicit mlp_dim means the ratio is never applied.
        let config = SamHqVisionConfig::builder()
            .with_mlp_ratio(1e300)
            .with_mlp_dim(3072)
            .build()
            .unwrap();
        assert_eq!(config.mlp_dim(), 3072);
    }

    #[test]
    fn null_mlp_dim_in_mapping_means_derive() {
        let config = SamHqVisionConfig::from_json_str(
            r#"{ "hidden_size": 1280, "num_attention_heads": 16, "mlp_dim": null }"#,
        )
        .unwrap();
        assert_eq!(config.mlp_dim(), 5120);
    }

    #[test]
    fn flat_mapping_round_trip_is_stable() {
        let config = SamHqVisionConfig::builder()
            .with_window_size(7)
            .with_use_rel_pos(false)
            .with_extra("architectures", json!(["SamHQVisionModel"]))
            .build()
            .unwrap();
        let mapping = config.to_flat_mapping().unwrap();
        assert_eq!(mapping["mlp_dim"], json!(3072));
        assert_eq!(mapping["global_attn_indexes"], json!([2, 5, 8, 11]));

        let rebuilt = SamHqVisionConfig::from_flat_mapping(mapping.clone()).unwrap();
        assert_eq!(rebuilt, config);
        assert_eq!(rebuilt.to_flat_mapping().unwrap(), mapping);
    }

    #[test]
    fn variants_build_cleanly() {
        for variant in [SamHqVariant::VitB, SamHqVariant::VitL, SamHqVariant::VitH] {
            let preset = SamHqVisionConfig::from_variant(variant);
            let validated = preset.clone().into_builder().build().unwrap();
            assert_eq!(preset, validated);
            assert_eq!(preset.mlp_dim(), variant.hidden_size() * 4);
        }
        assert_eq!(
            SamHqVisionConfig::from_variant(SamHqVariant::VitB),
            SamHqVisionConfig::new()
        );
    }

    #[test]
    fn global_attention_layers_are_reported() {
        let config = SamHqVisionConfig::new();
        assert!(config.is_global_attention_layer(5));
        assert!(!config.is_global_attention_layer(6));
    }
}
