pub mod builder;
pub(crate) mod model_runtime;
pub mod runtime;
pub mod traits;
