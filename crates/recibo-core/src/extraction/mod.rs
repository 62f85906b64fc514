//! Turning model text into receipt data.

mod fast_path;
pub mod normalize;
mod prompt;
mod response;

pub use fast_path::{FastPathMatcher, FastPathRule, KNOWN_MERCHANTS};
pub use prompt::DEFAULT_EXTRACTION_PROMPT;
pub use response::{extract_json_payload, parse_response};
