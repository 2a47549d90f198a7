pub mod analyzer;
pub mod pass;
pub mod rewriter;

pub use analyzer::{extract_result, DevirtStats, DevirtualizationAnalyzer};
pub use pass::{DevirtualizationOutcome, DevirtualizationPass};
pub use rewriter::{CallSiteRewriter, RewriteStats};
