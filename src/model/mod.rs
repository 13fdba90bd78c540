pub mod model_metadata;
pub mod model_storage;
pub mod inference_config;
pub mod config;
pub mod labels;

pub use model_metadata::{ModelMetadata, FORMAT_VERSION};
pub use model_storage::{save_model_with_metadata, load_metadata, load_model_with_metadata, print_metadata_info};
pub use inference_config::InferenceConfig;
pub use config::{AppConfig, ConverterSettings, DeviceType, Normalization, PathSettings, Precision, PreprocessSettings};
pub use labels::{ClassLabel, LabelList};
