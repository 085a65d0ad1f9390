mod preprocess;

pub use preprocess::{PreprocessArgs, cmd_preprocess};
