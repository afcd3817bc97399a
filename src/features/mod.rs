pub mod mfcc;

pub use mfcc::{MfccConfig, MfccExtractor};
