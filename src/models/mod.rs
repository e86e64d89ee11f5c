// Domain models: samples, tracked entity kinds, status updates

mod sample;
mod status;

pub use sample::{Counts, EntityKind, Rates, Sample};
pub use status::StatusUpdate;
