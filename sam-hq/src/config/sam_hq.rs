//! Top-level SAM-HQ configuration.

use std::fmt;

use burn::config::Config;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{
    enums::SamHqVariant,
    mapping::{check_extra, ConfigMapping, SubConfig},
    SamHqMaskDecoderConfig, SamHqMaskDecoderConfigBuilder, SamHqPromptEncoderConfig,
    SamHqVisionConfig,
};
use crate::error::{ensure, ensure_positive, SamHqError, SamHqResult};

/// Main configuration for the SAM-HQ model.
///
/// Owns exactly one vision encoder, prompt encoder and mask decoder configuration.
/// All three are always present and fully defaulted once the record is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SamHqConfigBuilder")]
pub struct SamHqConfig {
    vision_config: SamHqVisionConfig,
    prompt_encoder_config: SamHqPromptEncoderConfig,
    mask_decoder_config: SamHqMaskDecoderConfig,
    initializer_range: f64,
    extra: Map<String, Value>,
}

impl SamHqConfig {
    /// Discriminator used by model-loading code to pick this configuration type.
    pub const MODEL_TYPE: &'static str = "sam-hq";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> SamHqConfigBuilder {
        SamHqConfigBuilder::default()
    }

    /// The configuration of a published checkpoint.
    #[must_use]
    pub fn from_variant(variant: SamHqVariant) -> Self {
        Self {
            vision_config: SamHqVisionConfig::from_variant(variant),
            prompt_encoder_config: SamHqPromptEncoderConfig::new(),
            mask_decoder_config: SamHqMaskDecoderConfigBuilder::default()
                .with_vision_encoder_dim(variant.hidden_size())
                .resolve(),
            initializer_range: 0.02,
            extra: Map::new(),
        }
    }

    /// Re-opens the record, handing each sub-config back as a built instance.
    #[must_use]
    pub fn into_builder(self) -> SamHqConfigBuilder {
        SamHqConfigBuilder {
            vision_config: Some(SubConfig::Instance(self.vision_config)),
            prompt_encoder_config: Some(SubConfig::Instance(self.prompt_encoder_config)),
            mask_decoder_config: Some(SubConfig::Instance(self.mask_decoder_config)),
            initializer_range: self.initializer_range,
            model_type: None,
            extra: self.extra,
        }
    }

    #[must_use]
    pub const fn vision_config(&self) -> &SamHqVisionConfig {
        &self.vision_config
    }

    #[must_use]
    pub const fn prompt_encoder_config(&self) -> &SamHqPromptEncoderConfig {
        &self.prompt_encoder_config
    }

    #[must_use]
    pub const fn mask_decoder_config(&self) -> &SamHqMaskDecoderConfig {
        &self.mask_decoder_config
    }

    /// Standard deviation used to initialize weights outside the vision encoder.
    #[must_use]
    pub const fn initializer_range(&self) -> f64 {
        self.initializer_range
    }

    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Check that the three sub-configs describe modules that fit together.
    ///
    /// Construction only warns about these mismatches so that existing
    /// serialized configurations keep loading; callers that want a hard
    /// failure call this explicitly.
    ///
    /// # Errors
    ///
    /// Returns `Err(SamHqError::InvalidConfiguration)` for the first mismatch among:
    /// - `mask_decoder_config.vision_encoder_dim` vs `vision_config.hidden_size`
    /// - `vision_config.output_channels` vs `mask_decoder_config.hidden_size`
    /// - `prompt_encoder_config.hidden_size` vs `mask_decoder_config.hidden_size`
    /// - `prompt_encoder_config.image_embedding_size` vs the vision patch grid
    pub fn check_consistency(&self) -> SamHqResult<()> {
        let vision = &self.vision_config;
        let prompt = &self.prompt_encoder_config;
        let decoder = &self.mask_decoder_config;

        ensure(
            decoder.vision_encoder_dim() == vision.hidden_size(),
            "mask_decoder_config.vision_encoder_dim",
            decoder.vision_encoder_dim(),
            &format!(
                "does not match vision_config.hidden_size ({})",
                vision.hidden_size()
            ),
        )?;
        ensure(
            vision.output_channels() == decoder.hidden_size(),
            "vision_config.output_channels",
            vision.output_channels(),
            &format!(
                "does not match mask_decoder_config.hidden_size ({})",
                decoder.hidden_size()
            ),
        )?;
        ensure(
            prompt.hidden_size() == decoder.hidden_size(),
            "prompt_encoder_config.hidden_size",
            prompt.hidden_size(),
            &format!(
                "does not match mask_decoder_config.hidden_size ({})",
                decoder.hidden_size()
            ),
        )?;
        ensure(
            prompt.image_embedding_size() == vision.grid_size(),
            "prompt_encoder_config.image_embedding_size",
            prompt.image_embedding_size(),
            &format!("does not match the vision patch grid ({})", vision.grid_size()),
        )
    }
}

impl Default for SamHqConfig {
    fn default() -> Self {
        Self::from_variant(SamHqVariant::VitB)
    }
}

impl Serialize for SamHqConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5 + self.extra.len()))?;
        map.serialize_entry("model_type", Self::MODEL_TYPE)?;
        map.serialize_entry("vision_config", &self.vision_config)?;
        map.serialize_entry("prompt_encoder_config", &self.prompt_encoder_config)?;
        map.serialize_entry("mask_decoder_config", &self.mask_decoder_config)?;
        map.serialize_entry("initializer_range", &self.initializer_range)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Builder for [`SamHqConfig`].
///
/// Each sub-config may be left absent, given as a built record, or given as a
/// flattened mapping; `build()` normalizes all three the same way.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamHqConfigBuilder {
    vision_config: Option<SubConfig<SamHqVisionConfig>>,
    prompt_encoder_config: Option<SubConfig<SamHqPromptEncoderConfig>>,
    mask_decoder_config: Option<SubConfig<SamHqMaskDecoderConfig>>,
    initializer_range: f64,
    /// Consumed on input; the record always reports [`SamHqConfig::MODEL_TYPE`].
    model_type: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for SamHqConfigBuilder {
    fn default() -> Self {
        Self {
            vision_config: None,
            prompt_encoder_config: None,
            mask_decoder_config: None,
            initializer_range: 0.02,
            model_type: None,
            extra: Map::new(),
        }
    }
}

impl SamHqConfigBuilder {
    builder_setters! {
        with_initializer_range => initializer_range: f64,
    }

    /// Sets the vision encoder from a built record or a flattened mapping.
    #[must_use]
    pub fn with_vision_config(
        mut self,
        vision_config: impl Into<SubConfig<SamHqVisionConfig>>,
    ) -> Self {
        self.vision_config = Some(vision_config.into());
        self
    }

    /// Sets the prompt encoder from a built record or a flattened mapping.
    #[must_use]
    pub fn with_prompt_encoder_config(
        mut self,
        prompt_encoder_config: impl Into<SubConfig<SamHqPromptEncoderConfig>>,
    ) -> Self {
        self.prompt_encoder_config = Some(prompt_encoder_config.into());
        self
    }

    /// Sets the mask decoder from a built record or a flattened mapping.
    #[must_use]
    pub fn with_mask_decoder_config(
        mut self,
        mask_decoder_config: impl Into<SubConfig<SamHqMaskDecoderConfig>>,
    ) -> Self {
        self.mask_decoder_config = Some(mask_decoder_config.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Normalize the sub-configs and produce the record.
    ///
    /// Sub-config mismatches (see [`SamHqConfig::check_consistency`]) are logged,
    /// not rejected.
    ///
    /// # Errors
    ///
    /// Returns `Err(SamHqError::InvalidConfiguration)` if `initializer_range` is not a
    /// positive number, if an extra key shadows a typed field, or if a sub-config
    /// fails its own validation; sub-config field names are prefixed with the
    /// sub-config key, e.g. `vision_config.patch_size`.
    /// Returns `Err(SamHqError::Serialization)` if a sub-config mapping cannot be decoded.
    pub fn build(self) -> SamHqResult<SamHqConfig> {
        ensure_positive("initializer_range", self.initializer_range)?;
        check_extra(&self.extra, SamHqConfig::FIELDS)?;

        if let Some(model_type) = self
            .model_type
            .as_deref()
            .filter(|&model_type| model_type != SamHqConfig::MODEL_TYPE)
        {
            tracing::warn!(
                model_type,
                expected = SamHqConfig::MODEL_TYPE,
                "configuration declares a different model type"
            );
        }

        let config = SamHqConfig {
            vision_config: SubConfig::resolve(self.vision_config)
                .map_err(|err| err.within("vision_config"))?,
            prompt_encoder_config: SubConfig::resolve(self.prompt_encoder_config)
                .map_err(|err| err.within("prompt_encoder_config"))?,
            mask_decoder_config: SubConfig::resolve(self.mask_decoder_config)
                .map_err(|err| err.within("mask_decoder_config"))?,
            initializer_range: self.initializer_range,
            extra: self.extra,
        };

        if let Err(err) = config.check_consistency() {
            tracing::warn!(%err, "sub-configurations disagree; the composed model may not load");
        }

        Ok(config)
    }
}

impl TryFrom<SamHqConfigBuilder> for SamHqConfig {
    type Error = SamHqError;

    fn try_from(builder: SamHqConfigBuilder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl Config for SamHqConfig {}

impl ConfigMapping for SamHqConfig {
    type Builder = SamHqConfigBuilder;

    const FIELDS: &'static [&'static str] = &[
        "model_type",
        "vision_config",
        "prompt_encoder_config",
        "mask_decoder_config",
        "initializer_range",
    ];

    fn from_builder(builder: Self::Builder) -> SamHqResult<Self> {
        builder.build()
    }
}

impl fmt::Display for SamHqConfig {
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
    fn defaults_compose_default_sub_configs() {
        let config = SamHqConfig::new();
        assert_eq!(config.vision_config(), &SamHqVisionConfig::new());
        assert_eq!(config.prompt_encoder_config(), &SamHqPromptEncoderConfig::new());
        assert_eq!(config.mask_decoder_config(), &SamHqMaskDecoderConfig::new());
        assert_eq!(config.initializer_range(), 0.02);
        assert_eq!(SamHqConfig::builder().build().unwrap(), config);
    }

    #[test]
    fn built_instance_is_normalized() {
        let vision = SamHqVisionConfig::builder()
            .with_window_size(7)
            .build()
            .unwrap();
        let config = SamHqConfig::builder()
            .with_vision_config(vision)
            .build()
            .unwrap();
        assert_eq!(config.vision_config().window_size(), 7);
        assert_eq!(config.prompt_encoder_config(), &SamHqPromptEncoderConfig::new());
    }

    #[test]
    fn mapping_input_is_normalized() {
        let mapping = match json!({ "num_hidden_layers": 3 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let config = SamHqConfig::builder()
            .with_mask_decoder_config(mapping)
            .build()
            .unwrap();
        assert_eq!(config.mask_decoder_config().num_hidden_layers(), 3);
        assert_eq!(config.mask_decoder_config().mlp_dim(), 2048);
    }

    #[test]
    fn flat_mapping_nests_sub_configs() {
        let mapping = SamHqConfig::new().to_flat_mapping().unwrap();
        assert_eq!(mapping["model_type"], json!("sam-hq"));
        assert_eq!(mapping["initializer_range"], json!(0.02));
        assert_eq!(mapping["vision_config"]["mlp_dim"], json!(3072));
        assert_eq!(
            mapping["prompt_encoder_config"]["image_embedding_size"],
            json!(64)
        );
        assert_eq!(mapping["mask_decoder_config"]["vision_encoder_dim"], json!(768));
    }

    #[test]
    fn sub_config_errors_name_the_sub_config() {
        let result = SamHqConfig::from_json_str(r#"{ "vision_config": { "patch_size": 0 } }"#);
        match result {
            Err(SamHqError::InvalidConfiguration { field, value, .. }) => {
                assert_eq!(field, "vision_config.patch_size");
                assert_eq!(value, "0");
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn null_sub_configs_use_defaults() {
        let config = SamHqConfig::from_json_str(
            r#"{ "vision_config": null, "prompt_encoder_config": {}, "initializer_range": 0.01 }"#,
        )
        .unwrap();
        assert_eq!(config.vision_config(), &SamHqVisionConfig::new());
        assert_eq!(config.initializer_range(), 0.01);
    }

    #[test]
    fn model_type_is_consumed_not_kept_as_extra() {
        let config = SamHqConfig::from_json_str(r#"{ "model_type": "sam", "note": 1 }"#).unwrap();
        assert!(!config.extra().contains_key("model_type"));
        assert_eq!(config.extra().get("note"), Some(&json!(1)));
        assert_eq!(config.to_flat_mapping().unwrap()["model_type"], json!("sam-hq"));
    }

    #[test]
    fn inconsistent_sub_configs_load_but_fail_strict_check() {
        let config = SamHqConfig::builder()
            .with_mask_decoder_config(
                SamHqMaskDecoderConfig::builder()
                    .with_vision_encoder_dim(1280)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        match config.check_consistency() {
            Err(SamHqError::InvalidConfiguration { field, value, reason }) => {
                assert_eq!(field, "mask_decoder_config.vision_encoder_dim");
                assert_eq!(value, "1280");
                assert!(reason.contains("768"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn variants_are_self_consistent() {
        for variant in [SamHqVariant::VitB, SamHqVariant::VitL, SamHqVariant::VitH] {
            let config = SamHqConfig::from_variant(variant);
            assert!(config.check_consistency().is_ok());
            assert_eq!(
                config.mask_decoder_config().vision_encoder_dim(),
                variant.hidden_size()
            );
        }
    }

    #[test]
    fn non_positive_initializer_range_is_rejected() {
        match SamHqConfig::builder().with_initializer_range(-0.1).build() {
            Err(SamHqError::InvalidConfiguration { field, .. }) => {
                assert_eq!(field, "initializer_range");
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }
}
