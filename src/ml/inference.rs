//! モデル推論機能

use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ml::ml_model::PlantDiseaseClassifier;
use crate::ml::preprocess::load_image_tensor_data;
use crate::model::{load_model_with_metadata, InferenceConfig, LabelList, Precision};

/// 1枚の画像に対する分類結果
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// 最大スコアのクラスインデックス
    pub index: usize,
    /// クラス名
    pub label: String,
    /// 最大スコア（softmax後の確率）
    pub confidence: f32,
    /// 全クラスのスコア（ラベル順）
    pub scores: Vec<f32>,
}

/// 上位クラスの1件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedClass {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

impl Prediction {
    /// スコアの高い順に上位k件を返す
    pub fn top_k(&self, k: usize, labels: &LabelList) -> Vec<RankedClass> {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        order.sort_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]).then(a.cmp(&b)));

        order
            .into_iter()
            .take(k)
            .filter_map(|index| {
                labels.get(index).map(|label| RankedClass {
                    index,
                    label: label.as_str().to_string(),
                    score: self.scores[index],
                })
            })
            .collect()
    }
}

/// 最大値のインデックスを取得（同値の場合は先頭）
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: PlantDiseaseClassifier<B>,
    config: InferenceConfig,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルとクラス名リストを読み込んで推論エンジンを初期化
    ///
    /// クラス名リストはモデルに埋め込まれたラベルと完全に一致する必要があります。
    pub fn load(model_path: &Path, labels_path: &Path, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path)?;
        let config = InferenceConfig::from_metadata(&metadata);

        let labels = LabelList::load(labels_path)?;
        config.verify_labels(&labels, labels_path)?;

        let engine = Self::from_parts(config, model_binary, device)?;
        tracing::info!(
            "loaded {} ({} classes, {} precision)",
            model_path.display(),
            engine.config.num_total_classes(),
            engine.config.precision
        );
        Ok(engine)
    }

    /// 推論設定とモデルバイナリから初期化
    pub fn from_parts(config: InferenceConfig, model_binary: Vec<u8>, device: B::Device) -> Result<Self> {
        let model = config.architecture.init::<B>(&device);

        // 保存時の精度に合わせて重みを復元
        let model = match config.precision {
            Precision::Half => {
                let record = BinBytesRecorder::<HalfPrecisionSettings>::default()
                    .load(model_binary, &device)?;
                model.load_record(record)
            }
            Precision::Full => {
                let record = BinBytesRecorder::<FullPrecisionSettings>::default()
                    .load(model_binary, &device)?;
                model.load_record(record)
            }
        };

        let outputs = model.output_width(config.image_size as usize, &device);
        if outputs != config.num_total_classes() {
            return Err(Error::LabelMismatch {
                labels: config.num_total_classes(),
                outputs,
            });
        }

        Ok(Self {
            model,
            config,
            device,
        })
    }

    /// 単一画像を分類
    pub fn classify_image(&self, image_path: &Path) -> Result<Prediction> {
        let size = self.config.image_size as usize;
        let image_data =
            load_image_tensor_data(image_path, self.config.image_size, self.config.normalization)?;

        // Tensorに変換 [1, 3, size, size]
        let tensor = Tensor::<B, 4>::from_data(
            TensorData::new(image_data, [1, 3, size, size]),
            &self.device,
        );

        self.classify_tensor(tensor)
    }

    /// 前処理済みの1枚分のテンソルを分類
    pub fn classify_tensor(&self, images: Tensor<B, 4>) -> Result<Prediction> {
        let [batch_size, _, _, _] = images.dims();
        if batch_size != 1 {
            return Err(Error::Inference(format!(
                "expected a batch of 1 image, got {}",
                batch_size
            )));
        }

        let output = self.model.forward(images);
        let probabilities = softmax(output, 1);

        let scores = probabilities
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| Error::Inference(format!("failed to read output tensor: {:?}", e)))?;

        if scores.len() != self.config.num_total_classes() {
            return Err(Error::LabelMismatch {
                labels: self.config.num_total_classes(),
                outputs: scores.len(),
            });
        }

        let index = argmax(&scores)
            .ok_or_else(|| Error::Inference("model produced an empty output".to_string()))?;
        let label = self
            .config
            .class_index_to_label(index)
            .ok_or_else(|| Error::Inference(format!("class index {} is out of range", index)))?;

        tracing::debug!(index, label = label.as_str(), confidence = scores[index], "classified");

        Ok(Prediction {
            index,
            label: label.as_str().to_string(),
            confidence: scores[index],
            scores,
        })
    }

    /// 複数画像を順に分類
    pub fn classify_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<Prediction>> {
        image_paths
            .iter()
            .map(|path| self.classify_image(path.as_ref()))
            .collect()
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}
