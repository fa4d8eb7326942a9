//! Neural network layers

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{QuenchError, QuenchResult},
    tensor::{Shape, Tensor},
};

/// Activation applied after a dense layer's affine transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

impl Activation {
    /// Apply the activation in place, row by row
    pub fn apply(&self, data: &mut [f32], cols: usize) {
        match self {
            Activation::Linear => {}
            Activation::Relu => {
                for val in data.iter_mut() {
                    if *val < 0.0 {
                        *val = 0.0;
                    }
                }
            }
            Activation::Softmax => {
                for row in data.chunks_mut(cols) {
                    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                    let mut sum = 0.0;
                    for val in row.iter_mut() {
                        *val = (*val - max).exp();
                        sum += *val;
                    }
                    for val in row.iter_mut() {
                        *val /= sum;
                    }
                }
            }
        }
    }
}

/// Fully-connected layer: `output = activation(input * weights + bias)`
///
/// Weights are stored `[input_size, output_size]` row-major so a batched
/// forward pass walks them sequentially.
#[derive(Debug, Clone)]
pub struct Dense {
    weights: Tensor<2>,
    bias: Vec<f32>,
    activation: Activation,
}

impl Dense {
    /// Build a layer from trained parameters
    pub fn from_parts(
        weights: Tensor<2>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> QuenchResult<Self> {
        if bias.len() != weights.shape().cols() {
            return Err(QuenchError::shape_error(
                &format!("bias of length {}", weights.shape().cols()),
                &format!("length {}", bias.len()),
            ));
        }
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    /// Build a layer with random normal-ish weights, for tests and demos
    pub fn random(input_size: usize, output_size: usize, activation: Activation) -> Self {
        let mut rng = rand::thread_rng();
        let scale = (2.0 / input_size as f32).sqrt();
        let data: Vec<f32> = (0..input_size * output_size)
            .map(|_| (rng.gen::<f32>() - 0.5) * 2.0 * scale)
            .collect();
        let weights = Tensor::from_vec(data, Shape::new([input_size, output_size]))
            .expect("generated data matches shape");
        Self {
            weights,
            bias: vec![0.0; output_size],
            activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape().rows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape().cols()
    }

    pub fn weights(&self) -> &Tensor<2> {
        &self.weights
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Batched forward pass: `[batch, in] -> [batch, out]`
    pub fn forward(&self, input: &Tensor<2>) -> QuenchResult<Tensor<2>> {
        let batch = input.shape().rows();
        let in_size = input.shape().cols();
        if in_size != self.input_size() {
            return Err(QuenchError::shape_error(
                &format!("[{}, {}]", batch, self.input_size()),
                &input.shape().to_string(),
            ));
        }

        let out_size = self.output_size();
        let mut output = vec![0.0f32; batch * out_size];
        let x = input.as_slice();
        let w = self.weights.as_slice();

        for b in 0..batch {
            let row = &mut output[b * out_size..(b + 1) * out_size];
            row.copy_from_slice(&self.bias);
            for i in 0..in_size {
                let xv = x[b * in_size + i];
                if xv == 0.0 {
                    continue;
                }
                let wrow = &w[i * out_size..(i + 1) * out_size];
                for (o, &wv) in row.iter_mut().zip(wrow) {
                    *o += xv * wv;
                }
            }
        }

        self.activation.apply(&mut output, out_size);
        Tensor::from_vec(output, Shape::new([batch, out_size]))
    }
}
