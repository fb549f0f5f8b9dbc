//! Evaluation metrics for target/prediction frame pairs.
//!
//! Interface-level collaborator: each metric is a pure function of the two
//! frames, optionally restricted to the foreground of a mask. Shapes are
//! checked before any computation.

use serde::{Deserialize, Serialize};

use crate::errors::PreprocessError;
use crate::image::Frame;

/// Available metric functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Mse,
    Mae,
    RSquared,
    Pearson,
}

/// A metric over the whole frame plus, when a mask was supplied, the same
/// metric over the mask foreground only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub masked: Option<f64>,
}

/// Compute one metric, with an optional foreground restriction.
pub fn compute(
    kind: MetricKind,
    target: &Frame,
    prediction: &Frame,
    mask: Option<&Frame>,
) -> Result<MetricValue, PreprocessError> {
    check_shapes(target, prediction, mask)?;

    let all: Vec<(f64, f64)> = pairs(target, prediction, None);
    let value = evaluate(kind, &all)?;
    let masked = match mask {
        Some(mask) => {
            let fg = pairs(target, prediction, Some(mask));
            Some(evaluate(kind, &fg)?)
        }
        None => None,
    };
    Ok(MetricValue { value, masked })
}

fn check_shapes(
    target: &Frame,
    prediction: &Frame,
    mask: Option<&Frame>,
) -> Result<(), PreprocessError> {
    let same = |a: &Frame, b: &Frame| a.width() == b.width() && a.height() == b.height();
    if !same(target, prediction) {
        return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
            "target {}x{} vs prediction {}x{}",
            target.height(),
            target.width(),
            prediction.height(),
            prediction.width()
        )));
    }
    if let Some(mask) = mask {
        if !same(target, mask) {
            return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
                "mask {}x{} does not match target {}x{}",
                mask.height(),
                mask.width(),
                target.height(),
                target.width()
            )));
        }
    }
    Ok(())
}

fn pairs(target: &Frame, prediction: &Frame, mask: Option<&Frame>) -> Vec<(f64, f64)> {
    target
        .data()
        .iter()
        .zip(prediction.data())
        .enumerate()
        .filter(|(i, _)| match mask {
            Some(mask) => mask.data()[*i] > 0.0,
            None => true,
        })
        .map(|(_, (&t, &p))| (t as f64, p as f64))
        .collect()
}

fn evaluate(kind: MetricKind, pairs: &[(f64, f64)]) -> Result<f64, PreprocessError> {
    if pairs.is_empty() {
        return Err(PreprocessError::ShapeOrDtypeMismatch(
            "no pixels to evaluate (empty mask?)".to_string(),
        ));
    }
    let n = pairs.len() as f64;
    Ok(match kind {
        MetricKind::Mse => pairs.iter().map(|(t, p)| (t - p) * (t - p)).sum::<f64>() / n,
        MetricKind::Mae => pairs.iter().map(|(t, p)| (t - p).abs()).sum::<f64>() / n,
        MetricKind::RSquared => {
            let mean_t = pairs.iter().map(|(t, _)| t).sum::<f64>() / n;
            let ss_res: f64 = pairs.iter().map(|(t, p)| (t - p) * (t - p)).sum();
            let ss_tot: f64 = pairs.iter().map(|(t, _)| (t - mean_t) * (t - mean_t)).sum();
            if ss_tot == 0.0 {
                // Constant target: prediction either matches it or not
                if ss_res == 0.0 {
                    1.0
                } else {
                    f64::NEG_INFINITY
                }
            } else {
                1.0 - ss_res / ss_tot
            }
        }
        MetricKind::Pearson => {
            let mean_t = pairs.iter().map(|(t, _)| t).sum::<f64>() / n;
            let mean_p = pairs.iter().map(|(_, p)| p).sum::<f64>() / n;
            let cov: f64 = pairs
                .iter()
                .map(|(t, p)| (t - mean_t) * (p - mean_p))
                .sum();
            let var_t: f64 = pairs.iter().map(|(t, _)| (t - mean_t) * (t - mean_t)).sum();
            let var_p: f64 = pairs.iter().map(|(_, p)| (p - mean_p) * (p - mean_p)).sum();
            cov / (var_t.sqrt() * var_p.sqrt())
        }
    })
}
