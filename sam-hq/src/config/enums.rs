//! Enumeration types used in SAM-HQ configurations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Activation functions recognized in `hidden_act` fields.
///
/// Names follow the activation registry used by transformer checkpoints, so
/// `"gelu"` in a config file maps to [`Activation::Gelu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Gelu,
    GeluNew,
    GeluFast,
    GeluPython,
    GeluAccurate,
    GeluPytorchTanh,
    /// GELU clipped to `[-10, 10]`.
    #[serde(rename = "gelu_10")]
    Gelu10,
    QuickGelu,
    Laplace,
    Relu,
    /// Squared ReLU.
    Relu2,
    Relu6,
    Prelu,
    LeakyRelu,
    Silu,
    Swish,
    Mish,
    Tanh,
    Sigmoid,
    Linear,
}

impl Activation {
    /// The name used for this activation in serialized configurations.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gelu => "gelu",
            Self::GeluNew => "gelu_new",
            Self::GeluFast => "gelu_fast",
            Self::GeluPython => "gelu_python",
            Self::GeluAccurate => "gelu_accurate",
            Self::GeluPytorchTanh => "gelu_pytorch_tanh",
            Self::Gelu10 => "gelu_10",
            Self::QuickGelu => "quick_gelu",
            Self::Laplace => "laplace",
            Self::Relu => "relu",
            Self::Relu2 => "relu2",
            Self::Relu6 => "relu6",
            Self::Prelu => "prelu",
            Self::LeakyRelu => "leaky_relu",
            Self::Silu => "silu",
            Self::Swish => "swish",
            Self::Mish => "mish",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
            Self::Linear => "linear",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published SAM-HQ checkpoint architectures.
///
/// The variants differ only in the vision encoder; prompt encoder and mask
/// decoder keep their defaults apart from `vision_encoder_dim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamHqVariant {
    /// ViT-B: 768 dim, 12 layers, 12 heads.
    VitB,
    /// ViT-L: 1024 dim, 24 layers, 16 heads.
    VitL,
    /// ViT-H: 1280 dim, 32 layers, 16 heads.
    VitH,
}

impl SamHqVariant {
    /// Vision encoder width.
    #[must_use]
    pub const fn hidden_size(&self) -> usize {
        match self {
            Self::VitB => 768,
            Self::VitL => 1024,
            Self::VitH => 1280,
        }
    }

    #[must_use]
    pub const fn num_hidden_layers(&self) -> usize {
        match self {
            Self::VitB => 12,
            Self::VitL => 24,
            Self::VitH => 32,
        }
    }

    #[must_use]
    pub const fn num_attention_heads(&self) -> usize {
        match self {
            Self::VitB => 12,
            Self::VitL | Self::VitH => 16,
        }
    }

    /// Layers that use global attention; the last layer of each quarter of the stack.
    #[must_use]
    pub const fn global_attn_indexes(&self) -> [usize; 4] {
        match self {
            Self::VitB => [2, 5, 8, 11],
            Self::VitL => [5, 11, 17, 23],
            Self::VitH => [7, 15, 23, 31],
        }
    }
}
