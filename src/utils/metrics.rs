//! Classification metrics for the evaluator and the training driver
//!
//! - Overall accuracy and mean loss
//! - Per-class precision, recall and F1
//! - Confusion matrix
//! - Running accumulators used once per pass during training

use serde::{Deserialize, Serialize};

use crate::dataset::class_name;

/// Evaluation metrics over one partition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_samples: usize,
    pub correct_predictions: usize,
    /// Fraction of correct predictions, in `[0, 1]`
    pub accuracy: f64,
    /// Mean categorical cross-entropy
    pub average_loss: f64,
    /// Macro-averaged over classes that have support
    pub macro_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Build metrics from predicted and actual labels.
    ///
    /// Pairs beyond the shorter slice are ignored.
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let total_samples = confusion_matrix.total();
        if total_samples == 0 {
            return Self {
                confusion_matrix,
                ..Self::default()
            };
        }

        let correct_predictions = confusion_matrix.correct();
        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| {
                ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx)
                    .with_name(class_name(class_idx))
            })
            .collect();

        let supported: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let macro_f1 = if supported.is_empty() {
            0.0
        } else {
            supported.iter().map(|m| m.f1).sum::<f64>() / supported.len() as f64
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy: confusion_matrix.accuracy(),
            average_loss: 0.0,
            macro_f1,
            per_class,
            confusion_matrix,
        }
    }

    pub fn with_loss(mut self, average_loss: f64) -> Self {
        self.average_loss = average_loss;
        self
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Accuracy:  {:6.2}% ({}/{})", self.accuracy * 100.0, self.correct_predictions, self.total_samples)?;
        writeln!(f, "Loss:      {:.4}", self.average_loss)?;
        writeln!(f, "Macro F1:  {:6.2}%", self.macro_f1 * 100.0)?;
        writeln!(f)?;
        writeln!(f, "{:<12} {:>9} {:>9} {:>9} {:>8}", "class", "precision", "recall", "f1", "support")?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:<12} {:>9.3} {:>9.3} {:>9.3} {:>8}",
                m.class_name.as_deref().unwrap_or("?"),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        Ok(())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// TP / (TP + FP)
    pub precision: f64,
    /// TP / (TP + FN)
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class, actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class, predicted as another
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.class_name = Some(name.to_string());
        self
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion matrix, row = actual, column = predicted, stored row-major
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Out-of-range labels are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Confusion Matrix (rows=actual, cols=predicted):")?;
        write!(f, "{:>10}", "")?;
        for col in 0..self.num_classes {
            let name = class_name(col);
            write!(f, "{:>6}", &name[..name.len().min(5)])?;
        }
        writeln!(f)?;

        for row in 0..self.num_classes {
            let name = class_name(row);
            write!(f, "{:>10}", &name[..name.len().min(10)])?;
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    write!(f, "[{:>4}]", count)?;
                } else if count > 0 {
                    write!(f, " {:>4} ", count)?;
                } else {
                    write!(f, "    . ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Sample-weighted running mean, used for per-pass loss
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean covering `weight` samples
    pub fn add_weighted(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Accuracy accumulator for a pass
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch(&mut self, predictions: &[usize], ground_truth: &[usize]) {
        for (pred, gt) in predictions.iter().zip(ground_truth.iter()) {
            self.total += 1;
            if pred == gt {
                self.correct += 1;
            }
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn count(&self) -> usize {
        self.total
    }
}
