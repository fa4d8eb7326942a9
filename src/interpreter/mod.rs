//! Converted-model inference interpreter
//!
//! Mirrors the usual interpreter lifecycle: decode a buffer, allocate
//! execution tensors, set an input, invoke, read the output. Execution is
//! synchronous and single-threaded.

use half::f16;
use tracing::debug;

use crate::{
    error::{QuenchError, QuenchResult},
    quantization::core::QuantizationParams,
    quantization::schema::{ActivationParams, FlatModel, WeightBlock},
    tensor::{Shape, Tensor},
};

/// Execution-ready weights for one layer
enum WeightPlane {
    Float(Vec<f32>),
    DynamicInt8 {
        data: Vec<i8>,
        scale: f32,
    },
    FullInt8 {
        data: Vec<i8>,
        scale: f32,
        ranges: ActivationParams,
    },
}

/// Executes a converted model buffer
pub struct Interpreter {
    model: FlatModel,
    planes: Vec<WeightPlane>,
    input: Option<Tensor<2>>,
    output: Option<Tensor<2>>,
    allocated: bool,
}

impl Interpreter {
    /// Decode a converted buffer; fails on malformed input
    pub fn with_model_bytes(bytes: &[u8]) -> QuenchResult<Self> {
        let model = FlatModel::decode(bytes)?;
        Ok(Self {
            model,
            planes: Vec::new(),
            input: None,
            output: None,
            allocated: false,
        })
    }

    pub fn input_size(&self) -> usize {
        self.model.input_size
    }

    pub fn output_size(&self) -> usize {
        self.model.output_size()
    }

    pub fn num_layers(&self) -> usize {
        self.model.layers.len()
    }

    /// Materialize execution-ready weight planes
    ///
    /// Half-precision weights are expanded to f32 once here rather than on
    /// every invoke.
    pub fn allocate_tensors(&mut self) -> QuenchResult<()> {
        self.planes = self
            .model
            .layers
            .iter()
            .map(|layer| match (&layer.weights, layer.ranges) {
                (WeightBlock::F32(data), _) => WeightPlane::Float(data.clone()),
                (WeightBlock::F16(bits), _) => WeightPlane::Float(
                    bits.iter().map(|&b| f16::from_bits(b).to_f32()).collect(),
                ),
                (WeightBlock::Int8 { data, scale }, None) => WeightPlane::DynamicInt8 {
                    data: data.clone(),
                    scale: *scale,
                },
                (WeightBlock::Int8 { data, scale }, Some(ranges)) => WeightPlane::FullInt8 {
                    data: data.clone(),
                    scale: *scale,
                    ranges,
                },
            })
            .collect();
        self.allocated = true;
        debug!(layers = self.planes.len(), "tensors allocated");
        Ok(())
    }

    /// Stage the next input batch
    pub fn set_input(&mut self, input: Tensor<2>) -> QuenchResult<()> {
        if input.shape().cols() != self.model.input_size {
            return Err(QuenchError::shape_error(
                &format!("[batch, {}]", self.model.input_size),
                &input.shape().to_string(),
            ));
        }
        self.input = Some(input);
        Ok(())
    }

    /// Run the staged input through every layer
    pub fn invoke(&mut self) -> QuenchResult<()> {
        if !self.allocated {
            return Err(QuenchError::InvalidState(
                "invoke called before allocate_tensors".to_string(),
            ));
        }
        let input = self.input.as_ref().ok_or_else(|| {
            QuenchError::InvalidState("invoke called with no input set".to_string())
        })?;

        let batch = input.shape().rows();
        let mut current = input.as_slice().to_vec();
        let mut width = input.shape().cols();

        for (layer, plane) in self.model.layers.iter().zip(&self.planes) {
            let out_size = layer.output_size;
            let mut next = match plane {
                WeightPlane::Float(weights) => {
                    affine_f32(&current, batch, width, out_size, weights, &layer.bias)
                }
                WeightPlane::DynamicInt8 { data, scale } => {
                    affine_dynamic_i8(&current, batch, width, out_size, data, *scale, &layer.bias)
                }
                WeightPlane::FullInt8 {
                    data,
                    scale,
                    ranges,
                } => affine_full_i8(
                    &current,
                    batch,
                    width,
                    out_size,
                    data,
                    *scale,
                    &ranges.input,
                    &layer.bias,
                ),
            };

            layer.activation.apply(&mut next, out_size);

            // Full-integer layers carry the calibrated output range; pass
            // the activations through it so inference sees the same
            // quantization error an end-to-end integer pipeline would.
            if let WeightPlane::FullInt8 { ranges, .. } = plane {
                for v in next.iter_mut() {
                    *v = ranges.output.dequantize(ranges.output.quantize(*v));
                }
            }

            current = next;
            width = out_size;
        }

        self.output = Some(Tensor::from_vec(current, Shape::new([batch, width]))?);
        Ok(())
    }

    /// Output of the last invoke
    pub fn output(&self) -> QuenchResult<&Tensor<2>> {
        self.output.as_ref().ok_or_else(|| {
            QuenchError::InvalidState("no output available; call invoke first".to_string())
        })
    }
}

fn affine_f32(
    x: &[f32],
    batch: usize,
    in_size: usize,
    out_size: usize,
    weights: &[f32],
    bias: &[f32],
) -> Vec<f32> {
    let mut output = vec![0.0f32; batch * out_size];
    for b in 0..batch {
        let row = &mut output[b * out_size..(b + 1) * out_size];
        row.copy_from_slice(bias);
        for i in 0..in_size {
            let xv = x[b * in_size + i];
            if xv == 0.0 {
                continue;
            }
            let wrow = &weights[i * out_size..(i + 1) * out_size];
            for (o, &wv) in row.iter_mut().zip(wrow) {
                *o += xv * wv;
            }
        }
    }
    output
}

/// Dynamic-range kernel: each input row is quantized by its own absolute
/// maximum, multiplied in the integer domain, and rescaled.
fn affine_dynamic_i8(
    x: &[f32],
    batch: usize,
    in_size: usize,
    out_size: usize,
    weights: &[i8],
    weight_scale: f32,
    bias: &[f32],
) -> Vec<f32> {
    let mut output = vec![0.0f32; batch * out_size];
    let mut qx = vec![0i8; in_size];

    for b in 0..batch {
        let row = &x[b * in_size..(b + 1) * in_size];
        let abs_max = row.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
        let params = QuantizationParams::symmetric_i8(abs_max);
        for (q, &v) in qx.iter_mut().zip(row) {
            *q = params.quantize(v) as i8;
        }

        let rescale = params.scale * weight_scale;
        let out_row = &mut output[b * out_size..(b + 1) * out_size];
        for (o, out) in out_row.iter_mut().enumerate() {
            let mut acc = 0i32;
            for i in 0..in_size {
                acc += qx[i] as i32 * weights[i * out_size + o] as i32;
            }
            *out = acc as f32 * rescale + bias[o];
        }
    }
    output
}

/// Full-integer kernel: inputs quantized with the calibrated parameters,
/// i32 accumulation, rescale by the product of input and weight scales.
fn affine_full_i8(
    x: &[f32],
    batch: usize,
    in_size: usize,
    out_size: usize,
    weights: &[i8],
    weight_scale: f32,
    input_params: &QuantizationParams,
    bias: &[f32],
) -> Vec<f32> {
    let mut output = vec![0.0f32; batch * out_size];
    let mut qx = vec![0i32; in_size];
    let rescale = input_params.scale * weight_scale;

    for b in 0..batch {
        let row = &x[b * in_size..(b + 1) * in_size];
        for (q, &v) in qx.iter_mut().zip(row) {
            *q = input_params.quantize(v) - input_params.zero_point;
        }

        let out_row = &mut output[b * out_size..(b + 1) * out_size];
        for (o, out) in out_row.iter_mut().enumerate() {
            let mut acc = 0i32;
            for i in 0..in_size {
                acc += qx[i] * weights[i * out_size + o] as i32;
            }
            *out = acc as f32 * rescale + bias[o];
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, Dense, Model};
    use crate::quantization::converter::{Converter, Optimization, TargetType};
    use crate::runtime::Runtime;

    fn identity_model() -> Model {
        let weights =
            Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], Shape::new([2, 2])).unwrap();
        let layer = Dense::from_parts(weights, vec![0.0, 0.0], Activation::Linear).unwrap();
        Model::new(2).add_dense(layer).unwrap()
    }

    fn run(bytes: &[u8], input: Tensor<2>) -> Tensor<2> {
        let mut interp = Interpreter::with_model_bytes(bytes).unwrap();
        interp.allocate_tensors().unwrap();
        interp.set_input(input).unwrap();
        interp.invoke().unwrap();
        interp.output().unwrap().clone()
    }

    #[test]
    fn test_f32_execution_is_exact() {
        let rt = Runtime::new().unwrap();
        let bytes = Converter::from_model(&identity_model())
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let input = Tensor::from_vec(vec![3.0, -4.0], Shape::new([1, 2])).unwrap();
        let output = run(&bytes, input);
        assert_eq!(output.as_slice(), &[3.0, -4.0]);
    }

    #[test]
    fn test_dynamic_range_execution_is_close() {
        let rt = Runtime::new().unwrap();
        let bytes = Converter::from_model(&identity_model())
            .optimize(Optimization::DynamicRange)
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let input = Tensor::from_vec(vec![0.5, -0.25], Shape::new([1, 2])).unwrap();
        let output = run(&bytes, input);
        assert!((output.at(0, 0) - 0.5).abs() < 0.02);
        assert!((output.at(0, 1) + 0.25).abs() < 0.02);
    }

    #[test]
    fn test_float16_execution_is_close() {
        let rt = Runtime::new().unwrap();
        let bytes = Converter::from_model(&identity_model())
            .target_type(TargetType::Float16)
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let input = Tensor::from_vec(vec![1.5, 2.5], Shape::new([1, 2])).unwrap();
        let output = run(&bytes, input);
        assert!((output.at(0, 0) - 1.5).abs() < 1e-3);
        assert!((output.at(0, 1) - 2.5).abs() < 1e-3);
    }

    #[test]
    fn test_full_integer_execution_is_close() {
        let rt = Runtime::new().unwrap();
        let samples = vec![
            Tensor::from_vec(vec![-1.0, -1.0], Shape::new([1, 2])).unwrap(),
            Tensor::from_vec(vec![1.0, 1.0], Shape::new([1, 2])).unwrap(),
        ];
        let bytes = Converter::from_model(&identity_model())
            .optimize(Optimization::DynamicRange)
            .representative_dataset(samples)
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let input = Tensor::from_vec(vec![0.5, -0.5], Shape::new([1, 2])).unwrap();
        let output = run(&bytes, input);
        assert!((output.at(0, 0) - 0.5).abs() < 0.05);
        assert!((output.at(0, 1) + 0.5).abs() < 0.05);
    }

    #[test]
    fn test_invoke_before_allocate_is_error() {
        let rt = Runtime::new().unwrap();
        let bytes = Converter::from_model(&identity_model())
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let mut interp = Interpreter::with_model_bytes(&bytes).unwrap();
        let input = Tensor::zeros(Shape::new([1, 2])).unwrap();
        interp.set_input(input).unwrap();
        assert!(matches!(
            interp.invoke(),
            Err(QuenchError::InvalidState(_))
        ));
    }

    #[test]
    fn test_invoke_without_input_is_error() {
        let rt = Runtime::new().unwrap();
        let bytes = Converter::from_model(&identity_model())
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let mut interp = Interpreter::with_model_bytes(&bytes).unwrap();
        interp.allocate_tensors().unwrap();
        assert!(interp.invoke().is_err());
    }

    #[test]
    fn test_set_input_shape_mismatch() {
        let rt = Runtime::new().unwrap();
        let bytes = Converter::from_model(&identity_model())
            .convert(&rt)
            .unwrap()
            .into_bytes();

        let mut interp = Interpreter::with_model_bytes(&bytes).unwrap();
        let input = Tensor::zeros(Shape::new([1, 3])).unwrap();
        assert!(interp.set_input(input).is_err());
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        assert!(Interpreter::with_model_bytes(b"not a model").is_err());
        assert!(Interpreter::with_model_bytes(&[]).is_err());
    }
}
