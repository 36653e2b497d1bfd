pub(crate) mod cancel;
pub(crate) mod ledger;
pub(crate) mod pipeline;
pub(crate) mod sink;
