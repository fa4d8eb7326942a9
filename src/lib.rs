//! Quench - post-training quantization for feed-forward networks
//!
//! Features:
//! - Dynamic-range, full-integer, and float16 weight quantization
//! - Compact serialized model buffers with a built-in interpreter
//! - Activation-range calibration from representative data
//! - Accuracy and compressed-size measurement for converted models

pub mod error;
pub mod interpreter;
pub mod metrics;
pub mod nn;
pub mod quantization;
pub mod runtime;
pub mod tensor;

pub use error::{QuenchError, QuenchResult};
pub use interpreter::Interpreter;
pub use metrics::{evaluate_model, evaluate_model_report, gzipped_model_size, EvaluationReport};
pub use nn::{Activation, Dense, Model};
pub use quantization::{
    Converter, ConvertedModel, Optimization, QuantizationParams, TargetType,
};
pub use runtime::Runtime;
pub use tensor::{DType, Shape, Tensor};

/// Install the default tracing subscriber
///
/// Idempotent; later calls leave an already-installed subscriber in place.
pub fn init() -> QuenchResult<()> {
    let _ = tracing_subscriber::fmt().try_init();
    tracing::info!("quench initialized");
    Ok(())
}

/// Current crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Convert a model with default (dynamic-range) optimization
///
/// Weights become symmetric per-tensor i8; activations are quantized on
/// the fly at inference.
pub fn dynamic_range_quantize(rt: &Runtime, model: &Model) -> QuenchResult<ConvertedModel> {
    Converter::from_model(model)
        .optimize(Optimization::DynamicRange)
        .convert(rt)
}

/// Convert a model to full-integer form
///
/// The representative dataset calibrates per-layer activation ranges and
/// is a required input.
pub fn full_integer_quantize<I>(
    rt: &Runtime,
    representative_dataset: I,
    model: &Model,
) -> QuenchResult<ConvertedModel>
where
    I: IntoIterator<Item = Tensor<2>>,
{
    Converter::from_model(model)
        .optimize(Optimization::DynamicRange)
        .representative_dataset(representative_dataset)
        .convert(rt)
}

/// Convert a model constraining weights to 16-bit floats
pub fn float_quantize(rt: &Runtime, model: &Model) -> QuenchResult<ConvertedModel> {
    Converter::from_model(model)
        .optimize(Optimization::DynamicRange)
        .target_type(TargetType::Float16)
        .convert(rt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    fn test_model() -> Model {
        Model::new(8)
            .add_random_dense(16, Activation::Relu)
            .add_random_dense(4, Activation::Softmax)
    }

    fn samples() -> Vec<Tensor<2>> {
        (0..4)
            .map(|i| {
                let data: Vec<f32> = (0..8).map(|j| ((i * 8 + j) as f32).sin()).collect();
                Tensor::from_vec(data, Shape::new([1, 8])).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_pipeline_convert_then_measure() {
        let rt = Runtime::new().unwrap();
        let model = test_model();

        let dynamic = dynamic_range_quantize(&rt, &model).unwrap();
        let full = full_integer_quantize(&rt, samples(), &model).unwrap();
        let f16 = float_quantize(&rt, &model).unwrap();

        for converted in [&dynamic, &full, &f16] {
            assert!(!converted.is_empty());
            let size = gzipped_model_size(converted.as_bytes()).unwrap();
            assert!(size > 0);
        }
    }

    #[test]
    fn test_pipeline_accuracy_in_unit_interval() {
        let rt = Runtime::new().unwrap();
        let model = test_model();
        let converted = dynamic_range_quantize(&rt, &model).unwrap();

        let x_test = samples();
        let y_test = vec![0, 1, 2, 3];
        let accuracy = evaluate_model(converted.as_bytes(), &x_test, &y_test).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_quantized_buffers_are_smaller() {
        let rt = Runtime::new().unwrap();
        let model = test_model();

        let plain = Converter::from_model(&model).convert(&rt).unwrap();
        let dynamic = dynamic_range_quantize(&rt, &model).unwrap();
        let f16 = float_quantize(&rt, &model).unwrap();

        assert!(dynamic.len() < plain.len());
        assert!(f16.len() <= plain.len());
    }
}
