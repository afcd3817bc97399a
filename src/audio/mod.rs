pub mod capture;
pub mod loader;
pub mod recorder;
pub mod resampler;

pub use capture::{get_device, list_input_devices, AudioDevice};
pub use loader::{load_wav, AudioClip};
pub use recorder::{record_clip, save_wav};
pub use resampler::{AudioResampler, RECORD_SAMPLE_RATE};
