//! Core tensor types and fundamental operations

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::{QuenchError, QuenchResult};

/// Compile-time shape with const generics for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape<const DIMS: usize> {
    pub dims: [usize; DIMS],
}

impl<const DIMS: usize> Shape<DIMS> {
    pub fn new(dims: [usize; DIMS]) -> Self {
        Self { dims }
    }

    pub fn total_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_valid(&self) -> bool {
        self.dims.iter().all(|&d| d > 0)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.dims
    }
}

impl Shape<2> {
    pub fn rows(&self) -> usize {
        self.dims[0]
    }

    pub fn cols(&self) -> usize {
        self.dims[1]
    }
}

impl<const DIMS: usize> Display for Shape<DIMS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.dims
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Element types a converted model buffer can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    I8,
    U8,
}

impl DType {
    /// Size in bytes of this element type
    pub const fn size(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I8 => 1,
            DType::U8 => 1,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }

    pub const fn is_quantized(&self) -> bool {
        matches!(self, DType::I8 | DType::U8)
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::I8 => write!(f, "i8"),
            DType::U8 => write!(f, "u8"),
        }
    }
}

/// Dense row-major f32 tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<const DIMS: usize> {
    data: Vec<f32>,
    shape: Shape<DIMS>,
}

impl<const DIMS: usize> Tensor<DIMS> {
    /// Create a zero-filled tensor
    pub fn zeros(shape: Shape<DIMS>) -> QuenchResult<Self> {
        if !shape.is_valid() {
            return Err(QuenchError::ShapeError(format!("invalid shape {}", shape)));
        }
        Ok(Self {
            data: vec![0.0; shape.total_elements()],
            shape,
        })
    }

    /// Create from a vector, checking the element count against the shape
    pub fn from_vec(data: Vec<f32>, shape: Shape<DIMS>) -> QuenchResult<Self> {
        if data.len() != shape.total_elements() {
            return Err(QuenchError::ShapeError(format!(
                "data length {} does not match shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> Shape<DIMS> {
        self.shape
    }

    pub fn numel(&self) -> usize {
        self.shape.total_elements()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

impl Tensor<2> {
    /// Row-major element access
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.shape.cols() + col]
    }

    /// Index of the maximum element in a row
    pub fn argmax_row(&self, row: usize) -> usize {
        let cols = self.shape.cols();
        let start = row * cols;
        let mut best = 0;
        for col in 1..cols {
            if self.data[start + col] > self.data[start + best] {
                best = col;
            }
        }
        best
    }
}
