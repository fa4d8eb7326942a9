//! Activation range calibration from representative data

use tracing::debug;

use crate::{
    error::{QuenchError, QuenchResult},
    nn::Model,
    quantization::core::QuantizationParams,
    tensor::Tensor,
};

/// Running min/max over observed activation values
#[derive(Debug, Clone, Copy)]
pub struct RangeObserver {
    min: f32,
    max: f32,
    observed: bool,
}

impl RangeObserver {
    pub fn new() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            observed: false,
        }
    }

    pub fn observe(&mut self, data: &[f32]) {
        for &v in data {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.observed |= !data.is_empty();
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Asymmetric u8 parameters for the observed range
    pub fn to_params(&self) -> QuenchResult<QuantizationParams> {
        if !self.observed {
            return Err(QuenchError::CalibrationError(
                "no activation values observed".to_string(),
            ));
        }
        Ok(QuantizationParams::asymmetric_u8(self.min, self.max))
    }
}

impl Default for RangeObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// Calibrated input/output parameters for one layer
#[derive(Debug, Clone, Copy)]
pub struct LayerRanges {
    pub input: QuantizationParams,
    pub output: QuantizationParams,
}

/// Run the full-precision model over representative samples and record
/// per-layer activation ranges.
///
/// The representative dataset is an explicit argument; full-integer
/// conversion fails without one.
pub fn calibrate(model: &Model, samples: &[Tensor<2>]) -> QuenchResult<Vec<LayerRanges>> {
    if samples.is_empty() {
        return Err(QuenchError::CalibrationError(
            "representative dataset is empty".to_string(),
        ));
    }
    if model.is_empty() {
        return Err(QuenchError::CalibrationError(
            "model has no layers to calibrate".to_string(),
        ));
    }

    let mut observers: Vec<(RangeObserver, RangeObserver)> =
        vec![(RangeObserver::new(), RangeObserver::new()); model.num_layers()];

    for sample in samples {
        if sample.shape().cols() != model.input_size() {
            return Err(QuenchError::shape_error(
                &format!("[batch, {}]", model.input_size()),
                &sample.shape().to_string(),
            ));
        }

        let mut current = sample.clone();
        for (layer, (input_obs, output_obs)) in model.layers().iter().zip(observers.iter_mut()) {
            input_obs.observe(current.as_slice());
            current = layer.forward(&current)?;
            output_obs.observe(current.as_slice());
        }
    }

    debug!(
        samples = samples.len(),
        layers = model.num_layers(),
        "calibration pass complete"
    );

    observers
        .into_iter()
        .map(|(input, output)| {
            Ok(LayerRanges {
                input: input.to_params()?,
                output: output.to_params()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Activation;
    use crate::tensor::{DType, Shape};

    fn test_model() -> Model {
        Model::new(4)
            .add_random_dense(8, Activation::Relu)
            .add_random_dense(3, Activation::Softmax)
    }

    #[test]
    fn test_range_observer() {
        let mut obs = RangeObserver::new();
        obs.observe(&[0.5, -2.0, 1.5]);
        obs.observe(&[3.0]);
        assert_eq!(obs.min(), -2.0);
        assert_eq!(obs.max(), 3.0);

        let params = obs.to_params().unwrap();
        assert_eq!(params.dtype, DType::U8);
    }

    #[test]
    fn test_empty_observer_is_error() {
        let obs = RangeObserver::new();
        assert!(obs.to_params().is_err());
    }

    #[test]
    fn test_calibrate_produces_per_layer_ranges() {
        let model = test_model();
        let samples = vec![
            Tensor::from_vec(vec![0.1, 0.9, -0.4, 0.2], Shape::new([1, 4])).unwrap(),
            Tensor::from_vec(vec![-1.0, 0.0, 0.5, 1.0], Shape::new([1, 4])).unwrap(),
        ];

        let ranges = calibrate(&model, &samples).unwrap();
        assert_eq!(ranges.len(), 2);
        for r in &ranges {
            assert!(r.input.scale.is_finite());
            assert!(r.output.scale.is_finite());
        }
    }

    #[test]
    fn test_calibrate_requires_samples() {
        let model = test_model();
        assert!(calibrate(&model, &[]).is_err());
    }

    #[test]
    fn test_calibrate_rejects_bad_sample_shape() {
        let model = test_model();
        let samples = vec![Tensor::zeros(Shape::new([1, 3])).unwrap()];
        assert!(calibrate(&model, &samples).is_err());
    }
}
