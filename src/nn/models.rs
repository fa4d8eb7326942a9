//! Neural network models

use crate::{
    error::{QuenchError, QuenchResult},
    nn::layers::{Activation, Dense},
    tensor::Tensor,
};

/// Feed-forward classifier: an ordered stack of dense layers
///
/// The model is the caller-owned "trained network" handed to the converter.
/// Conversion borrows it and never mutates it.
#[derive(Debug, Clone)]
pub struct Model {
    layers: Vec<Dense>,
    input_size: usize,
}

impl Model {
    pub fn new(input_size: usize) -> Self {
        Self {
            layers: Vec::new(),
            input_size,
        }
    }

    /// Append a dense layer, validating the chain of sizes
    pub fn add_dense(mut self, layer: Dense) -> QuenchResult<Self> {
        let expected = self.output_size();
        if layer.input_size() != expected {
            return Err(QuenchError::shape_error(
                &format!("layer with input size {}", expected),
                &format!("input size {}", layer.input_size()),
            ));
        }
        self.layers.push(layer);
        Ok(self)
    }

    /// Append a randomly initialized dense layer, for tests and demos
    pub fn add_random_dense(self, output_size: usize, activation: Activation) -> Self {
        let input = self.output_size();
        let layer = Dense::random(input, output_size, activation);
        self.add_dense(layer).expect("random layer sizes chain")
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Output width of the last layer, or the input size for an empty model
    pub fn output_size(&self) -> usize {
        self.layers
            .last()
            .map(|l| l.output_size())
            .unwrap_or(self.input_size)
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Full-precision forward pass through every layer
    pub fn forward(&self, input: &Tensor<2>) -> QuenchResult<Tensor<2>> {
        if input.shape().cols() != self.input_size {
            return Err(QuenchError::shape_error(
                &format!("[batch, {}]", self.input_size),
                &input.shape().to_string(),
            ));
        }
        let mut output = input.clone();
        for layer in &self.layers {
            output = layer.forward(&output)?;
        }
        Ok(output)
    }

    /// Serialized size of the full-precision parameters, in bytes
    pub fn parameter_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|l| (l.weights().numel() + l.bias().len()) * 4)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Shape;

    #[test]
    fn test_model_builder() {
        let model = Model::new(4)
            .add_random_dense(8, Activation::Relu)
            .add_random_dense(3, Activation::Softmax);
        assert_eq!(model.num_layers(), 2);
        assert_eq!(model.input_size(), 4);
        assert_eq!(model.output_size(), 3);
    }

    #[test]
    fn test_size_chain_validation() {
        let model = Model::new(4);
        let bad = Dense::random(5, 2, Activation::Linear);
        assert!(model.add_dense(bad).is_err());
    }

    #[test]
    fn test_forward_shapes() {
        let model = Model::new(4)
            .add_random_dense(8, Activation::Relu)
            .add_random_dense(3, Activation::Softmax);

        let input = Tensor::zeros(Shape::new([2, 4])).unwrap();
        let output = model.forward(&input).unwrap();
        assert_eq!(output.shape().dims, [2, 3]);
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let model = Model::new(4).add_random_dense(2, Activation::Linear);
        let input = Tensor::zeros(Shape::new([1, 5])).unwrap();
        assert!(model.forward(&input).is_err());
    }

    #[test]
    fn test_parameter_bytes() {
        let model = Model::new(2).add_random_dense(3, Activation::Linear);
        // 2*3 weights + 3 bias values, 4 bytes each
        assert_eq!(model.parameter_bytes(), 36);
    }
}
