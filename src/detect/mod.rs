mod classifier;
mod model;
pub mod structural;

pub use classifier::ClassifyStep;
pub use model::{strip_code_fences, visible_text, ModelClient, ModelDetection};
pub use structural::{StructuralMatch, STRUCTURAL_CONFIDENCE};
