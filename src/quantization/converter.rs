//! Model conversion with optional quantization
//!
//! `Converter` borrows a trained model, collects conversion flags the way
//! the builder pattern reads elsewhere in this crate, and emits an owned
//! serialized buffer. The input model is never mutated.

use rayon::prelude::*;
use tracing::info;

use crate::{
    error::{QuenchError, QuenchResult},
    nn::{Dense, Model},
    quantization::calibration::{calibrate, LayerRanges},
    quantization::core::quantize_weights_i8,
    quantization::schema::{ActivationParams, FlatLayer, FlatModel, WeightBlock},
    runtime::Runtime,
    tensor::Tensor,
};

/// Conversion-time optimizations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    /// Weights to symmetric i8; activations quantized on the fly at inference
    DynamicRange,
}

/// Reduced-precision target types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Float16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Passthrough,
    DynamicRange,
    Float16,
    FullInteger,
}

/// An owned, serialized converted model
#[derive(Debug, Clone)]
pub struct ConvertedModel {
    bytes: Vec<u8>,
}

impl ConvertedModel {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for ConvertedModel {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Builder over a borrowed trained model
pub struct Converter<'a> {
    model: &'a Model,
    optimizations: Vec<Optimization>,
    target_types: Vec<TargetType>,
    representative: Option<Vec<Tensor<2>>>,
}

impl<'a> Converter<'a> {
    pub fn from_model(model: &'a Model) -> Self {
        Self {
            model,
            optimizations: Vec::new(),
            target_types: Vec::new(),
            representative: None,
        }
    }

    pub fn optimize(mut self, optimization: Optimization) -> Self {
        self.optimizations.push(optimization);
        self
    }

    pub fn target_type(mut self, target: TargetType) -> Self {
        self.target_types.push(target);
        self
    }

    /// Supply the representative samples used to calibrate activation
    /// ranges for full-integer conversion.
    pub fn representative_dataset<I>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = Tensor<2>>,
    {
        self.representative = Some(samples.into_iter().collect());
        self
    }

    fn mode(&self) -> Mode {
        if self.target_types.contains(&TargetType::Float16) {
            Mode::Float16
        } else if self.representative.is_some() {
            Mode::FullInteger
        } else if !self.optimizations.is_empty() {
            Mode::DynamicRange
        } else {
            Mode::Passthrough
        }
    }

    /// Run the conversion and serialize the result
    pub fn convert(&self, rt: &Runtime) -> QuenchResult<ConvertedModel> {
        if self.model.is_empty() {
            return Err(QuenchError::ConversionError(
                "cannot convert a model with no layers".to_string(),
            ));
        }

        let mode = self.mode();
        let ranges: Option<Vec<LayerRanges>> = match mode {
            Mode::FullInteger => {
                let samples = self.representative.as_deref().ok_or_else(|| {
                    QuenchError::CalibrationError(
                        "full-integer conversion requires a representative dataset".to_string(),
                    )
                })?;
                Some(calibrate(self.model, samples)?)
            }
            _ => None,
        };

        let layers: Vec<FlatLayer> = rt.install(|| {
            self.model
                .layers()
                .par_iter()
                .enumerate()
                .map(|(idx, layer)| flatten_layer(layer, mode, ranges.as_ref().map(|r| r[idx])))
                .collect()
        });

        let flat = FlatModel {
            input_size: self.model.input_size(),
            layers,
        };
        let bytes = flat.encode()?;

        info!(
            mode = ?mode,
            layers = flat.layers.len(),
            bytes = bytes.len(),
            "model converted"
        );

        Ok(ConvertedModel { bytes })
    }
}

fn flatten_layer(layer: &Dense, mode: Mode, ranges: Option<LayerRanges>) -> FlatLayer {
    let weights = layer.weights().as_slice();
    let (block, activation_params) = match mode {
        Mode::Passthrough => (WeightBlock::F32(weights.to_vec()), None),
        Mode::Float16 => {
            let data = weights
                .iter()
                .map(|&v| half::f16::from_f32(v).to_bits())
                .collect();
            (WeightBlock::F16(data), None)
        }
        Mode::DynamicRange => {
            let (data, scale) = quantize_weights_i8(weights);
            (WeightBlock::Int8 { data, scale }, None)
        }
        Mode::FullInteger => {
            let (data, scale) = quantize_weights_i8(weights);
            let ranges = ranges.expect("full-integer mode carries calibrated ranges");
            (
                WeightBlock::Int8 { data, scale },
                Some(ActivationParams {
                    input: ranges.input,
                    output: ranges.output,
                }),
            )
        }
    };

    FlatLayer {
        input_size: layer.input_size(),
        output_size: layer.output_size(),
        activation: layer.activation(),
        weights: block,
        bias: layer.bias().to_vec(),
        ranges: activation_params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Activation;
    use crate::tensor::Shape;

    fn test_model() -> Model {
        Model::new(4)
            .add_random_dense(8, Activation::Relu)
            .add_random_dense(3, Activation::Softmax)
    }

    fn samples() -> Vec<Tensor<2>> {
        vec![
            Tensor::from_vec(vec![0.1, 0.9, -0.4, 0.2], Shape::new([1, 4])).unwrap(),
            Tensor::from_vec(vec![-1.0, 0.0, 0.5, 1.0], Shape::new([1, 4])).unwrap(),
        ]
    }

    #[test]
    fn test_each_mode_yields_nonempty_buffer() {
        let rt = Runtime::new().unwrap();
        let model = test_model();

        let plain = Converter::from_model(&model).convert(&rt).unwrap();
        let dynamic = Converter::from_model(&model)
            .optimize(Optimization::DynamicRange)
            .convert(&rt)
            .unwrap();
        let f16 = Converter::from_model(&model)
            .optimize(Optimization::DynamicRange)
            .target_type(TargetType::Float16)
            .convert(&rt)
            .unwrap();
        let full = Converter::from_model(&model)
            .optimize(Optimization::DynamicRange)
            .representative_dataset(samples())
            .convert(&rt)
            .unwrap();

        for buffer in [&plain, &dynamic, &f16, &full] {
            assert!(!buffer.is_empty());
        }
    }

    #[test]
    fn test_float16_buffer_not_larger_than_f32() {
        let rt = Runtime::new().unwrap();
        let model = test_model();

        let plain = Converter::from_model(&model).convert(&rt).unwrap();
        let f16 = Converter::from_model(&model)
            .target_type(TargetType::Float16)
            .convert(&rt)
            .unwrap();

        assert!(f16.len() <= plain.len());
    }

    #[test]
    fn test_dynamic_range_shrinks_buffer() {
        let rt = Runtime::new().unwrap();
        let model = test_model();

        let plain = Converter::from_model(&model).convert(&rt).unwrap();
        let dynamic = Converter::from_model(&model)
            .optimize(Optimization::DynamicRange)
            .convert(&rt)
            .unwrap();

        assert!(dynamic.len() < plain.len());
    }

    #[test]
    fn test_conversion_is_deterministic_in_size() {
        let rt = Runtime::new().unwrap();
        let model = test_model();

        let first = Converter::from_model(&model)
            .optimize(Optimization::DynamicRange)
            .convert(&rt)
            .unwrap();
        let second = Converter::from_model(&model)
            .optimize(Optimization::DynamicRange)
            .convert(&rt)
            .unwrap();

        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn test_empty_model_is_error() {
        let rt = Runtime::new().unwrap();
        let model = Model::new(4);
        assert!(Converter::from_model(&model).convert(&rt).is_err());
    }

    #[test]
    fn test_empty_representative_set_is_error() {
        let rt = Runtime::new().unwrap();
        let model = test_model();
        let result = Converter::from_model(&model)
            .representative_dataset(Vec::new())
            .convert(&rt);
        assert!(result.is_err());
    }
}
