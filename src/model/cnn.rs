//! CNN model for CIFAR-10 classification
//!
//! Two convolutional blocks followed by a dense classifier:
//!
//! ```text
//! conv k1 -> relu -> [dropout] -> conv k1 -> relu -> maxpool 2x2 -> dropout
//! [conv k2 -> relu] x2 -> maxpool 2x2 -> dropout
//! flatten -> dense -> relu -> dropout -> dense(num_classes)
//! ```
//!
//! Convolutions use "same" padding. For even kernels the extra row and
//! column go at the bottom and right, so output size always equals input size.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::dataset::corpus::ImageShape;
use crate::dataset::prepare::DatasetMetadata;
use crate::model::config::{CifarCnnConfig, OptimizerConfig};
use crate::model::loss::{Loss, Metric};
use crate::utils::error::{CifarError, Result};

/// Convolution with output size equal to input size
#[derive(Module, Debug)]
pub struct SameConv<B: Backend> {
    pub conv: Conv2d<B>,
    /// Extra zero rows/columns appended at the bottom/right (even kernels)
    trailing_pad: usize,
}

impl<B: Backend> SameConv<B> {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        let total = kernel_size - 1;
        let leading = total / 2;

        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(leading, leading))
            .init(device);

        Self {
            conv,
            trailing_pad: total - 2 * leading,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = if self.trailing_pad > 0 {
            pad_bottom_right(x, self.trailing_pad)
        } else {
            x
        };
        self.conv.forward(x)
    }
}

fn pad_bottom_right<B: Backend>(x: Tensor<B, 4>, amount: usize) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let device = x.device();

    let bottom = Tensor::zeros([batch, channels, amount, width], &device);
    let x = Tensor::cat(vec![x, bottom], 2);

    let right = Tensor::zeros([batch, channels, height + amount, amount], &device);
    Tensor::cat(vec![x, right], 3)
}

/// Two same-padded convolutions with ReLU, then 2x2 max pooling and dropout.
///
/// `inner_dropout` sits between the convolutions; a rate of 0 disables it.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: SameConv<B>,
    pub inner_dropout: Dropout,
    pub conv2: SameConv<B>,
    pub pool: MaxPool2d,
    pub dropout: Dropout,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        inner_dropout: f64,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            conv1: SameConv::new(in_channels, out_channels, kernel_size, device),
            inner_dropout: DropoutConfig::new(inner_dropout).init(),
            conv2: SameConv::new(out_channels, out_channels, kernel_size, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(dropout).init(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.inner_dropout.forward(x);
        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);
        self.dropout.forward(x)
    }
}

/// CIFAR-10 classifier
#[derive(Module, Debug)]
pub struct CifarCnn<B: Backend> {
    pub block1: ConvBlock<B>,
    pub block2: ConvBlock<B>,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    pub relu: Relu,
    num_classes: usize,
}

impl<B: Backend> CifarCnn<B> {
    pub fn new(config: &CifarCnnConfig, device: &B::Device) -> Self {
        let block1 = ConvBlock::new(
            config.in_channels,
            config.block1_filters,
            config.block1_kernel,
            config.block1_inner_dropout,
            config.conv_dropout,
            device,
        );
        let block2 = ConvBlock::new(
            config.block1_filters,
            config.block2_filters,
            config.block2_kernel,
            0.0,
            config.conv_dropout,
            device,
        );

        Self {
            block1,
            block2,
            fc1: LinearConfig::new(config.flattened_features(), config.dense_units).init(device),
            dropout: DropoutConfig::new(config.dense_dropout).init(),
            fc2: LinearConfig::new(config.dense_units, config.num_classes).init(device),
            relu: Relu::new(),
            num_classes: config.num_classes,
        }
    }

    /// Logits for a batch `[batch, channels, height, width]`, shape `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);

        // [B, C, H, W] -> [B, C*H*W]
        let x = x.flatten::<2>(1, 3);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// A model bound to its optimizer settings, loss and metric, ready for training
#[derive(Debug)]
pub struct CompiledModel<B: Backend> {
    pub model: CifarCnn<B>,
    pub config: CifarCnnConfig,
    pub optimizer: OptimizerConfig,
    pub loss: Loss,
    pub metric: Metric,
    pub metadata: DatasetMetadata,
}

/// Build the network for a dataset's shape metadata.
///
/// Fails with `ShapeMismatch` if the data shape differs from the configured
/// input, or if the spatial size does not survive both pooling stages evenly.
pub fn build_model<B: Backend>(
    metadata: &DatasetMetadata,
    config: &CifarCnnConfig,
    optimizer: &OptimizerConfig,
    device: &B::Device,
) -> Result<CompiledModel<B>> {
    config.validate()?;
    optimizer.validate()?;

    let expected = config.input_shape();
    if metadata.input_shape != expected {
        return Err(CifarError::ShapeMismatch {
            expected,
            found: metadata.input_shape,
        });
    }

    let [channels, height, width] = expected.dims();
    if height == 0 || width == 0 || height % 4 != 0 || width % 4 != 0 {
        return Err(CifarError::ShapeMismatch {
            expected: ImageShape::new(channels, height - height % 4, width - width % 4),
            found: metadata.input_shape,
        });
    }

    if metadata.num_classes != config.num_classes {
        return Err(CifarError::Config(format!(
            "model has {} outputs but the dataset has {} classes",
            config.num_classes, metadata.num_classes
        )));
    }

    let model = CifarCnn::new(config, device);
    tracing::info!(
        "Built CNN for {} input: {} parameters, loss={}, metric={}, optimizer=RMSprop(lr={})",
        expected,
        model.num_params(),
        Loss::CategoricalCrossEntropy.name(),
        Metric::Accuracy.name(),
        optimizer.learning_rate
    );

    Ok(CompiledModel {
        model,
        config: config.clone(),
        optimizer: optimizer.clone(),
        loss: Loss::CategoricalCrossEntropy,
        metric: Metric::Accuracy,
        metadata: *metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn metadata(shape: ImageShape) -> DatasetMetadata {
        DatasetMetadata {
            input_shape: shape,
            num_classes: 10,
        }
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = CifarCnn::<TestBackend>::new(&CifarCnnConfig::new(), &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [2, 10]);
    }

    #[test]
    fn test_even_kernel_keeps_spatial_size() {
        let device = Default::default();
        let conv = SameConv::<TestBackend>::new(3, 4, 2, &device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        assert_eq!(conv.forward(input).dims(), [1, 4, 8, 8]);

        let conv = SameConv::<TestBackend>::new(3, 4, 3, &device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        assert_eq!(conv.forward(input).dims(), [1, 4, 8, 8]);
    }

    #[test]
    fn test_earlier_variant_topology() {
        let device = Default::default();
        let config = CifarCnnConfig::new()
            .with_block2_kernel(3)
            .with_block1_inner_dropout(0.5);
        let model = CifarCnn::<TestBackend>::new(&config, &device);

        assert_eq!(model.block1.inner_dropout.prob, 0.5);
        assert_eq!(model.block2.inner_dropout.prob, 0.0);
        assert_eq!(model.block1.dropout.prob, 0.25);
        assert_eq!(model.block2.dropout.prob, 0.25);
        assert_eq!(model.dropout.prob, 0.5);
        assert_eq!(model.block2.conv1.conv.weight.dims(), [64, 32, 3, 3]);
        assert_eq!(model.block1.conv2.conv.weight.dims(), [32, 32, 3, 3]);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 10]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = CifarCnn::<TestBackend>::new(&CifarCnnConfig::new(), &device);
        let input = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device);

        let sums: Vec<f32> = model.forward_softmax(input).sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_build_model_shape_mismatch() {
        let device = Default::default();
        let result = build_model::<TestBackend>(
            &metadata(ImageShape::new(1, 28, 28)),
            &CifarCnnConfig::new(),
            &OptimizerConfig::default(),
            &device,
        );
        match result {
            Err(CifarError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, ImageShape::new(3, 32, 32));
                assert_eq!(found, ImageShape::new(1, 28, 28));
            }
            other => panic!("expected ShapeMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_model_rejects_unpoolable_size() {
        let device = Default::default();
        let config = CifarCnnConfig::new().with_input_height(30).with_input_width(30);
        let result = build_model::<TestBackend>(
            &metadata(ImageShape::new(3, 30, 30)),
            &config,
            &OptimizerConfig::default(),
            &device,
        );
        assert!(matches!(result, Err(CifarError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_build_model() {
        let device = Default::default();
        let compiled = build_model::<TestBackend>(
            &metadata(ImageShape::new(3, 32, 32)),
            &CifarCnnConfig::new(),
            &OptimizerConfig::default(),
            &device,
        )
        .unwrap();

        assert_eq!(compiled.loss, Loss::CategoricalCrossEntropy);
        assert_eq!(compiled.metric, Metric::Accuracy);
        assert_eq!(compiled.model.num_classes(), 10);
    }
}
