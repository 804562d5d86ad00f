//! Transform request vocabulary
//!
//! Everything a request can say about the image it wants: the parameter
//! set, the output format, and Accept-header negotiation. Two URL shapes
//! are understood:
//!
//! - Query parameters: `/_img/hero.jpg?w=300&q=80&f=webp`
//! - Path options: `/_img/w:300,q:80,f:webp/hero.jpg`
//!
//! Both decode into the same [`TransformParams`], so equal requests meet
//! in the same cache entry regardless of spelling.

pub mod error;
pub mod format;
pub mod params;

pub use error::RequestError;
pub use format::{negotiate_format, source_content_type, vary_header};
pub use params::{OutputFormat, TransformParams};
