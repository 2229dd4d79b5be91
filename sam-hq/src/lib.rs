//! # SAM-HQ configuration
//!
//! Hyperparameter records for the SAM-HQ segmentation model family: a
//! windowed-attention ViT vision encoder, a prompt encoder for points and
//! boxes, and a mask decoder with an IoU quality head, composed under
//! [`SamHqConfig`].
//!
//! Records are immutable once built and convert to and from flattened keyed
//! mappings ([`ConfigMapping`]). They also implement burn's [`Config`] trait,
//! so `save`/`load` persist them as JSON.
//!
//! ```
//! use sam_hq_burn::{ConfigMapping, SamHqConfig, SamHqVisionConfig};
//!
//! let vision = SamHqVisionConfig::builder().with_window_size(7).build()?;
//! let config = SamHqConfig::builder().with_vision_config(vision).build()?;
//!
//! let mapping = config.to_flat_mapping()?;
//! assert_eq!(SamHqConfig::from_flat_mapping(mapping)?, config);
//! # Ok::<(), sam_hq_burn::SamHqError>(())
//! ```

mod config;
mod error;

pub use burn::config::Config;
pub use config::*;
pub use error::{SamHqError, SamHqResult};
