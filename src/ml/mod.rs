pub mod ml_model;
pub mod preprocess;
pub mod inference;
pub mod conversion;

pub use ml_model::{ClassifierConfig, PlantDiseaseClassifier, IMAGE_SIZE, MIN_IMAGE_SIZE};
pub use preprocess::{image_to_chw, load_image_tensor_data, resize_square};
pub use inference::{argmax, InferenceEngine, Prediction, RankedClass};
pub use conversion::{convert_model, load_architecture, ConversionPhase, ConversionReport, ConversionRequest};
