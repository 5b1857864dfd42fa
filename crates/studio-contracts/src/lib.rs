pub mod aspect;
pub mod events;
pub mod history;
pub mod style;

pub use aspect::AspectRatio;
pub use history::{HistoryEntry, HistoryStore, JsonHistoryStore};
pub use style::{ColorGradingStyle, GenerationMode, LightingIntensity, QualityMode, StyleSettings};
