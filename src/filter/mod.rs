pub mod category;
pub mod pipeline;
pub mod stats;

pub use category::Category;
pub use pipeline::{matches, Filter};
pub use stats::{FilterStats, RuleStats};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("unsupported category `{0}`")]
    UnsupportedCategory(String),
}
