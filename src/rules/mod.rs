pub mod errors;
pub mod payload;
pub mod refresher;
pub mod source;
pub mod store;

pub use refresher::{RefreshStatus, RefresherConfig, RuleRefresher};
pub use source::{LocalSource, RemoteSource, RuleSource};
pub use store::{CategoryRules, RuleOrigin, RuleSet, RuleStore};
