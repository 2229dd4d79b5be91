//! Conversion between configuration records and flattened keyed mappings.
//!
//! A flattened mapping is the JSON object form of a record: every typed field
//! by name, derived fields included, plus any extra metadata keys. Nested
//! sub-configs of [`SamHqConfig`](super::SamHqConfig) appear as nested objects.

use std::path::Path;

use burn::config::Config;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::{SamHqMaskDecoderConfig, SamHqPromptEncoderConfig, SamHqVisionConfig};
use crate::error::{SamHqError, SamHqResult};

/// A configuration record that can be flattened to, and rebuilt from, a keyed mapping.
///
/// Decoding goes through the record's builder so that defaults fill absent keys,
/// unknown keys land in the extra metadata, and validation failures keep their
/// structured [`SamHqError`] instead of being folded into a decoder message.
pub trait ConfigMapping: Config {
    /// The builder every key of a mapping is decoded into.
    type Builder: DeserializeOwned;

    /// Keys owned by typed fields. Extra metadata may not reuse them.
    const FIELDS: &'static [&'static str];

    /// Validates a decoded builder and produces the record.
    fn from_builder(builder: Self::Builder) -> SamHqResult<Self>;

    /// The record's full field set, derived fields and extra metadata included.
    fn to_flat_mapping(&self) -> SamHqResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(mapping) => Ok(mapping),
            other => Err(SamHqError::Serialization {
                reason: format!("expected a keyed mapping, got {other}"),
            }),
        }
    }

    /// Builds a record from a mapping, applying defaults for absent keys.
    fn from_flat_mapping(mapping: Map<String, Value>) -> SamHqResult<Self> {
        let builder = serde_json::from_value::<Self::Builder>(Value::Object(mapping))?;
        Self::from_builder(builder)
    }

    fn to_json_string(&self) -> SamHqResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn from_json_str(json: &str) -> SamHqResult<Self> {
        let builder = serde_json::from_str::<Self::Builder>(json)?;
        Self::from_builder(builder)
    }

    /// Reads a JSON file. Unlike [`Config::load`], validation errors keep their variant.
    fn load_json<P: AsRef<Path>>(path: P) -> SamHqResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Rejects extra metadata keys that collide with a typed field.
pub(crate) fn check_extra(extra: &Map<String, Value>, fields: &[&str]) -> SamHqResult<()> {
    match extra.iter().find(|(key, _)| fields.contains(&key.as_str())) {
        Some((key, value)) => Err(SamHqError::invalid(
            key.clone(),
            value,
            "extra metadata key shadows a typed field",
        )),
        None => Ok(()),
    }
}

/// A sub-config supplied either as a built record or as a flattened mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum SubConfig<C> {
    /// An already built record. It is flattened and rebuilt on resolution.
    Instance(C),
    /// A flattened keyed mapping. Absent keys take their defaults.
    Mapping(Map<String, Value>),
}

impl<C: ConfigMapping> SubConfig<C> {
    /// The flattened form of either representation.
    pub fn into_mapping(self) -> SamHqResult<Map<String, Value>> {
        match self {
            Self::Instance(config) => config.to_flat_mapping(),
            Self::Mapping(mapping) => Ok(mapping),
        }
    }

    /// Normalizes an optional sub-config into a fresh, fully defaulted record.
    ///
    /// An absent input is treated as an empty mapping. A built instance is
    /// flattened and rebuilt, so the result never shares state with the input.
    pub fn resolve(input: Option<Self>) -> SamHqResult<C> {
        let mapping = match input {
            Some(sub_config) => sub_config.into_mapping()?,
            None => Map::new(),
        };
        C::from_flat_mapping(mapping)
    }
}

impl<C> From<Map<String, Value>> for SubConfig<C> {
    fn from(mapping: Map<String, Value>) -> Self {
        Self::Mapping(mapping)
    }
}

impl From<SamHqVisionConfig> for SubConfig<SamHqVisionConfig> {
    fn from(config: SamHqVisionConfig) -> Self {
        Self::Instance(config)
    }
}

impl From<SamHqPromptEncoderConfig> for SubConfig<SamHqPromptEncoderConfig> {
    fn from(config: SamHqPromptEncoderConfig) -> Self {
        Self::Instance(config)
    }
}

impl From<SamHqMaskDecoderConfig> for SubConfig<SamHqMaskDecoderConfig> {
    fn from(config: SamHqMaskDecoderConfig) -> Self {
        Self::Instance(config)
    }
}

// Serialized sub-configs are always nested objects.
impl<'de, C> Deserialize<'de> for SubConfig<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::Mapping)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn mapping(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn absent_sub_config_resolves_to_defaults() {
        let resolved = SubConfig::<SamHqPromptEncoderConfig>::resolve(None).unwrap();
        assert_eq!(resolved, SamHqPromptEncoderConfig::new());
    }

    #[test]
    fn instance_and_mapping_resolve_identically() {
        let instance = SamHqVisionConfig::builder()
            .with_window_size(7)
            .build()
            .unwrap();
        let as_mapping = instance.to_flat_mapping().unwrap();

        let from_instance =
            SubConfig::<SamHqVisionConfig>::resolve(Some(SubConfig::from(instance))).unwrap();
        let from_mapping =
            SubConfig::<SamHqVisionConfig>::resolve(Some(SubConfig::from(as_mapping))).unwrap();

        assert_eq!(from_instance, from_mapping);
        assert_eq!(from_instance.window_size(), 7);
    }

    #[test]
    fn partial_mapping_is_filled_with_defaults() {
        let resolved = SubConfig::<SamHqMaskDecoderConfig>::resolve(Some(SubConfig::from(
            mapping(json!({ "num_hidden_layers": 4 })),
        )))
        .unwrap();
        assert_eq!(resolved.num_hidden_layers(), 4);
        assert_eq!(resolved.mlp_dim(), 2048);
    }

    #[test]
    fn extra_keys_may_not_shadow_fields() {
        let extra = mapping(json!({ "hidden_size": 3 }));
        match check_extra(&extra, &["hidden_size"]) {
            Err(SamHqError::InvalidConfiguration { field, value, .. }) => {
                assert_eq!(field, "hidden_size");
                assert_eq!(value, "3");
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
        assert!(check_extra(&mapping(json!({ "note": "x" })), &["hidden_size"]).is_ok());
    }

    #[test]
    fn sub_config_deserializes_as_mapping() {
        let sub: SubConfig<SamHqVisionConfig> =
            serde_json::from_value(json!({ "window_size": 7 })).unwrap();
        assert_eq!(sub, SubConfig::Mapping(mapping(json!({ "window_size": 7 }))));
        assert!(serde_json::from_value::<SubConfig<SamHqVisionConfig>>(json!(7)).is_err());
    }
}
