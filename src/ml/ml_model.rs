//! 機械学習モデルの共通定義
//!
//! 葉の画像から病害クラスを分類するCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// 画像サイズ（学習時の入力解像度）
pub const IMAGE_SIZE: usize = 128;

/// 最小入力サイズ（2x2プーリング3回で1ピクセル以上残る大きさ）
pub const MIN_IMAGE_SIZE: usize = 8;

/// モデル設定
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 最初の畳み込み層のチャネル数（以降2倍ずつ増える）
    #[config(default = 32)]
    pub base_channels: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ClassifierConfig {
    /// 全結合層に入る特徴次元
    pub fn feature_dim(&self) -> usize {
        self.base_channels * 4
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> PlantDiseaseClassifier<B> {
        let c1 = self.base_channels;
        let c2 = c1 * 2;
        let c3 = c1 * 4;
        let d = self.feature_dim();

        tracing::debug!(
            channels = ?[c1, c2, c3],
            feature_dim = d,
            num_classes = self.num_classes,
            "initializing classifier"
        );

        PlantDiseaseClassifier {
            conv1: conv3x3(3, c1, device),
            conv2: conv3x3(c1, c2, device),
            conv3: conv3x3(c2, c3, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(d, d).init(device),
            fc2: LinearConfig::new(d, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

fn conv3x3<B: Backend>(channels_in: usize, channels_out: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([channels_in, channels_out], [3, 3])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

/// 植物病害分類用CNNモデル
///
/// 任意サイズ（8x8以上）のRGB画像を任意のクラス数に分類します。
///
/// # アーキテクチャ
/// - {Conv 3x3 (same padding) + ReLU + MaxPool 2x2} x 3層
/// - Global Average Pooling
/// - FC: d -> d + ReLU + Dropout
/// - FC: d -> num_classes
#[derive(Module, Debug)]
pub struct PlantDiseaseClassifier<B: Backend> {
    conv1: Conv2d<B>, // 3 -> c
    conv2: Conv2d<B>, // c -> 2c
    conv3: Conv2d<B>, // 2c -> 4c
    pool: MaxPool2d,
    global_pool: AdaptiveAvgPool2d,

    fc1: Linear<B>,
    fc2: Linear<B>,

    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> PlantDiseaseClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, height, width]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.block(&self.conv1, images);
        let x = self.block(&self.conv2, x);
        let x = self.block(&self.conv3, x);

        // [batch, 4c, 1, 1] -> [batch, 4c]
        let x = self.global_pool.forward(x);
        let [_, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    fn block(&self, conv: &Conv2d<B>, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = conv.forward(x);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }

    /// 出力クラス数を実際の順伝播で確認する
    ///
    /// 重みを読み込んだ後のモデルに対して、ゼロ画像1枚を流して出力幅を返します。
    pub fn output_width(&self, image_size: usize, device: &B::Device) -> usize {
        let input = Tensor::<B, 4>::zeros([1, 3, image_size, image_size], device);
        let [_, width] = self.forward(input).dims();
        width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = ClassifierConfig::new(5)
            .with_base_channels(4)
            .init::<B>(&device);

        let images = Tensor::<B, 4>::zeros([2, 3, 16, 16], &device);
        let output = model.forward(images);

        assert_eq!(output.dims(), [2, 5]);
    }

    #[test]
    fn test_output_width_independent_of_image_size() {
        let device = Default::default();
        let model = ClassifierConfig::new(7)
            .with_base_channels(2)
            .init::<B>(&device);

        assert_eq!(model.output_width(MIN_IMAGE_SIZE, &device), 7);
        assert_eq!(model.output_width(24, &device), 7);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = ClassifierConfig::new(38);
        assert_eq!(config.base_channels, 32);
        assert_eq!(config.feature_dim(), 128);

        let json = serde_json::to_string(&config).unwrap();
        let restored: ClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.num_classes, 38);
        assert_eq!(restored.base_channels, 32);
    }
}
