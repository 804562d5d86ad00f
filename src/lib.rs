// Kagami image optimization layer
//
// Mount point for hosts: initialize an ImageLayer, route requests
// through its middleware, and hand the generation bridge to the static
// build step.

pub mod cache;
pub mod config;
pub mod constants;
pub mod generate;
pub mod layer;
pub mod logging;
pub mod metrics;
pub mod provider;
pub mod runtime;
pub mod serve;
pub mod server;
pub mod transform;

pub use cache::{CacheStats, TransformCache, TransformEntry, TransformKey};
pub use config::{RawOptions, ResolvedOptions};
pub use generate::{GenerationReport, StaticGenerationBridge};
pub use layer::{ImageLayer, InitError};
pub use provider::{ImageTransformer, Provider, ProviderRegistry, TransformError};
pub use runtime::RuntimeOptions;
pub use serve::{ImageRequest, Outcome, ServingMiddleware};
pub use transform::{OutputFormat, RequestError, TransformParams};
