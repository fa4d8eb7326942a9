//! Core quantization functionality

use serde::{Deserialize, Serialize};

use crate::tensor::DType;

/// Affine quantization parameters: `real = (quant - zero_point) * scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i32,
    pub dtype: DType,
}

impl QuantizationParams {
    /// Symmetric i8 parameters from the largest absolute value
    ///
    /// A zero-range tensor gets scale 1.0 so quantization stays finite.
    pub fn symmetric_i8(abs_max: f32) -> Self {
        let scale = if abs_max > 0.0 { abs_max / 127.0 } else { 1.0 };
        Self {
            scale,
            zero_point: 0,
            dtype: DType::I8,
        }
    }

    /// Asymmetric u8 parameters covering `[min, max]`
    pub fn asymmetric_u8(min: f32, max: f32) -> Self {
        let range = max - min;
        let scale = if range > 0.0 { range / 255.0 } else { 1.0 };
        let zero_point = (-min / scale).round().clamp(0.0, 255.0) as i32;
        Self {
            scale,
            zero_point,
            dtype: DType::U8,
        }
    }

    /// Representable integer range for the target dtype
    pub fn quant_range(&self) -> (i32, i32) {
        match self.dtype {
            DType::I8 => (-127, 127),
            DType::U8 => (0, 255),
            DType::F32 | DType::F16 => (i32::MIN, i32::MAX),
        }
    }

    pub fn quantize(&self, value: f32) -> i32 {
        let (qmin, qmax) = self.quant_range();
        let q = (value / self.scale).round() as i32 + self.zero_point;
        q.clamp(qmin, qmax)
    }

    pub fn dequantize(&self, quantized: i32) -> f32 {
        (quantized - self.zero_point) as f32 * self.scale
    }
}

/// Quantize a weight slice to symmetric per-tensor i8
pub fn quantize_weights_i8(data: &[f32]) -> (Vec<i8>, f32) {
    let abs_max = data.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
    let params = QuantizationParams::symmetric_i8(abs_max);
    let quantized = data
        .iter()
        .map(|&v| params.quantize(v) as i8)
        .collect();
    (quantized, params.scale)
}
