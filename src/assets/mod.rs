pub(crate) mod cache;
pub(crate) mod decode;
pub(crate) mod eviction;
pub(crate) mod loader;
