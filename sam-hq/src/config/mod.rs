//! Configuration module for SAM-HQ.
//!
//! This module provides the hyperparameter records for the SAM-HQ model family.
//! It is organized into the following submodules:
//! - `vision`: the windowed-attention ViT image encoder
//! - `prompt_encoder`: the point/box prompt encoder
//! - `mask_decoder`: the two-way transformer mask decoder and its IoU head
//! - `sam_hq`: the top-level record owning one of each of the above
//! - `mapping`: flattened-mapping conversion shared by all records
//! - `enums`: activation names and published model variants
//!
//! Every record is immutable once built. Changes go through `into_builder()`,
//! which re-runs derivation and validation on `build()`.

/// Generates `with_*` setters on a builder, one per `setter => field: Type` entry.
macro_rules! builder_setters {
    ($($setter:ident => $field:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Sets `", stringify!($field), "`.")]
            #[must_use]
            pub fn $setter(mut self, $field: $ty) -> Self {
                self.$field = $field;
                self
            }
        )*
    };
}

pub mod enums;
pub mod mapping;
pub mod mask_decoder;
pub mod prompt_encoder;
pub mod sam_hq;
pub mod vision;

pub use enums::{Activation, SamHqVariant};
pub use mapping::{ConfigMapping, SubConfig};
pub use mask_decoder::{SamHqMaskDecoderConfig, SamHqMaskDecoderConfigBuilder};
pub use prompt_encoder::{SamHqPromptEncoderConfig, SamHqPromptEncoderConfigBuilder};
pub use sam_hq::{SamHqConfig, SamHqConfigBuilder};
pub use vision::{SamHqVisionConfig, SamHqVisionConfigBuilder};
