//! Model measurement: classification accuracy and compressed size

use std::io::Write;

use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{QuenchError, QuenchResult},
    interpreter::Interpreter,
    tensor::Tensor,
};

/// Accuracy summary for one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub correct: usize,
    pub total: usize,
    pub accuracy: f32,
}

impl EvaluationReport {
    pub fn from_counts(correct: usize, total: usize) -> Self {
        let accuracy = if total > 0 {
            correct as f32 / total as f32
        } else {
            0.0
        };
        Self {
            correct,
            total,
            accuracy,
        }
    }

    pub fn to_json(&self) -> QuenchResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Classify every test sample with the converted model and report accuracy
///
/// Each sample is a single-row tensor paired with its expected class index.
pub fn evaluate_model_report(
    model_bytes: &[u8],
    x_test: &[Tensor<2>],
    y_test: &[usize],
) -> QuenchResult<EvaluationReport> {
    if x_test.is_empty() {
        return Err(QuenchError::InvalidInput(
            "test set is empty".to_string(),
        ));
    }
    if x_test.len() != y_test.len() {
        return Err(QuenchError::InvalidInput(format!(
            "{} test samples but {} labels",
            x_test.len(),
            y_test.len()
        )));
    }

    let mut interpreter = Interpreter::with_model_bytes(model_bytes)?;
    interpreter.allocate_tensors()?;

    let mut correct = 0;
    for (i, (sample, &label)) in x_test.iter().zip(y_test).enumerate() {
        if i % 1000 == 0 {
            debug!(evaluated = i, "evaluation progress");
        }
        if sample.shape().rows() != 1 {
            return Err(QuenchError::InvalidInput(format!(
                "test sample {} has batch size {}, expected 1",
                i,
                sample.shape().rows()
            )));
        }

        interpreter.set_input(sample.clone())?;
        interpreter.invoke()?;
        let predicted = interpreter.output()?.argmax_row(0);
        if predicted == label {
            correct += 1;
        }
    }

    let report = EvaluationReport::from_counts(correct, x_test.len());
    debug!(
        correct = report.correct,
        total = report.total,
        accuracy = report.accuracy,
        "evaluation complete"
    );
    Ok(report)
}

/// Classification accuracy of a converted model over a labeled test set
pub fn evaluate_model(
    model_bytes: &[u8],
    x_test: &[Tensor<2>],
    y_test: &[usize],
) -> QuenchResult<f32> {
    Ok(evaluate_model_report(model_bytes, x_test, y_test)?.accuracy)
}

/// Gzip the converted buffer into a scoped temp file and report the
/// compressed size in bytes.
///
/// The temp file is removed when the handle drops, on success and on every
/// error path.
pub fn gzipped_model_size(model_bytes: &[u8]) -> QuenchResult<u64> {
    let file = tempfile::NamedTempFile::new()?;

    let mut encoder = GzEncoder::new(file.as_file(), Compression::default());
    encoder.write_all(model_bytes)?;
    encoder.finish()?;

    let size = file.as_file().metadata()?.len();
    Ok(size)
}
