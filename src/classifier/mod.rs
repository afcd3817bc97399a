pub mod labels;
pub mod model;
pub mod record;

pub use labels::LabelDecoder;
pub use model::{CryClassifier, FeatureScaler, Prediction};
pub use record::{ClassificationRecord, LabelScore};
