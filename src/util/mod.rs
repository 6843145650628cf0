//! Utility functions shared by the fetcher, normalizer and config layers.
//!
//! - **Text**: markup stripping, whitespace collapsing, control-character removal
//! - **URLs**: resolving scraped links against their page and basic scheme checks

mod links;
mod text;

pub use self::links::{is_web_url, resolve_url};
pub use self::text::{collapse_whitespace, strip_control_chars, strip_markup};
