//! Converted-model wire format
//!
//! A converted buffer is a 4-byte magic, a little-endian u16 format
//! version, and a bincode payload. Decoding validates the header and the
//! internal consistency of the layer stack before the interpreter touches
//! any of it.

use serde::{Deserialize, Serialize};

use crate::{
    error::{QuenchError, QuenchResult},
    nn::Activation,
    quantization::core::QuantizationParams,
    tensor::DType,
};

pub const MAGIC: [u8; 4] = *b"QNCH";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Weight storage for one layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WeightBlock {
    F32(Vec<f32>),
    /// IEEE half precision, stored as raw bit patterns
    F16(Vec<u16>),
    /// Symmetric per-tensor i8 with its dequantization scale
    Int8 { data: Vec<i8>, scale: f32 },
}

impl WeightBlock {
    pub fn dtype(&self) -> DType {
        match self {
            WeightBlock::F32(_) => DType::F32,
            WeightBlock::F16(_) => DType::F16,
            WeightBlock::Int8 { .. } => DType::I8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WeightBlock::F32(data) => data.len(),
            WeightBlock::F16(data) => data.len(),
            WeightBlock::Int8 { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calibrated activation parameters for the full-integer path
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivationParams {
    pub input: QuantizationParams,
    pub output: QuantizationParams,
}

/// One serialized dense layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatLayer {
    pub input_size: usize,
    pub output_size: usize,
    pub activation: Activation,
    pub weights: WeightBlock,
    pub bias: Vec<f32>,
    /// Present only for full-integer conversions
    pub ranges: Option<ActivationParams>,
}

/// A complete serialized model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatModel {
    pub input_size: usize,
    pub layers: Vec<FlatLayer>,
}

impl FlatModel {
    /// Serialize with the header prepended
    pub fn encode(&self) -> QuenchResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(HEADER_LEN);
        buffer.extend_from_slice(&MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bincode::serialize_into(&mut buffer, self)?;
        Ok(buffer)
    }

    /// Decode and validate a converted buffer
    pub fn decode(bytes: &[u8]) -> QuenchResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(QuenchError::InterpreterError(format!(
                "buffer of {} bytes is too short to be a converted model",
                bytes.len()
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(QuenchError::InterpreterError(
                "bad magic: not a converted model buffer".to_string(),
            ));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(QuenchError::InterpreterError(format!(
                "unsupported format version {}",
                version
            )));
        }

        let model: FlatModel = bincode::deserialize(&bytes[HEADER_LEN..])?;
        model.validate()?;
        Ok(model)
    }

    /// Structural consistency checks on the layer stack
    pub fn validate(&self) -> QuenchResult<()> {
        let mut expected_input = self.input_size;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.input_size != expected_input {
                return Err(QuenchError::InterpreterError(format!(
                    "layer {} expects input size {}, previous layer produces {}",
                    idx, layer.input_size, expected_input
                )));
            }
            let expected_weights = layer.input_size * layer.output_size;
            if layer.weights.len() != expected_weights {
                return Err(QuenchError::InterpreterError(format!(
                    "layer {} has {} weights, expected {}",
                    idx,
                    layer.weights.len(),
                    expected_weights
                )));
            }
            if layer.bias.len() != layer.output_size {
                return Err(QuenchError::InterpreterError(format!(
                    "layer {} has {} bias values, expected {}",
                    idx,
                    layer.bias.len(),
                    layer.output_size
                )));
            }
            expected_input = layer.output_size;
        }
        Ok(())
    }

    /// Output width of the last layer
    pub fn output_size(&self) -> usize {
        self.layers
            .last()
            .map(|l| l.output_size)
            .unwrap_or(self.input_size)
    }
}
