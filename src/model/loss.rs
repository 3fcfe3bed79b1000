//! Categorical cross-entropy over one-hot targets and the accuracy metric

use burn::tensor::activation::log_softmax;
use burn::tensor::{backend::Backend, Int, Tensor};

/// Loss bound to a model at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    CategoricalCrossEntropy,
}

impl Loss {
    /// Mean loss over the batch, shape `[1]`
    pub fn compute<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Loss::CategoricalCrossEntropy => categorical_cross_entropy(logits, targets),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::CategoricalCrossEntropy => "categorical_crossentropy",
        }
    }
}

/// Metric reported alongside the loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Accuracy,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
        }
    }
}

/// `-(sum_c t_c * log softmax(z)_c)`, averaged over the batch.
///
/// `logits`: `[batch, classes]`, `targets`: one-hot `[batch, classes]`.
pub fn categorical_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (targets * log_probs).sum_dim(1).mean().neg()
}

/// Predicted class per row, `[batch]`
pub fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    logits.argmax(1).flatten::<1>(0, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray;

    #[test]
    fn test_uniform_logits_give_log_num_classes() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 10], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(
                [vec![1.0f32], vec![0.0; 9], vec![0.0; 9], vec![1.0]].concat(),
                [2, 10],
            ),
            &device,
        );

        let loss: f64 = categorical_cross_entropy(logits, targets).into_scalar().elem();
        assert!((loss - 10f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_confident_correct_prediction_has_low_loss() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[10.0, 0.0, 0.0]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, 0.0]], &device);

        let loss: f64 = Loss::CategoricalCrossEntropy
            .compute(logits, targets)
            .into_scalar()
            .elem();
        assert!(loss < 1e-3);
    }

    #[test]
    fn test_predictions() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.9, 0.0], [2.0, 1.0, 0.5]], &device);

        let preds: Vec<i64> = predictions(logits).into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(preds, vec![1, 0]);
    }
}
