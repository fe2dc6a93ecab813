//! Format adapters for reading/writing each tool's native configuration files.

mod claude;
mod copilot;
pub(crate) mod frontmatter;
mod gemini;
pub mod traits;
pub(crate) mod utils;

pub use claude::ClaudeAdapter;
pub use copilot::CopilotAdapter;
pub use gemini::GeminiAdapter;
pub use traits::{Capability, ConversionOptions, FormatAdapter};
pub use utils::hash_content;

#[cfg(test)]
pub use traits::MockFormatAdapter;
