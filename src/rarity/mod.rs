pub(crate) mod distribution;
pub(crate) mod feasibility;
pub(crate) mod sampler;
pub(crate) mod weights;
