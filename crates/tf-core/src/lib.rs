//! tf-core: shared data model, errors, configuration, and the batch event bus.
//!
//! Every other trackforge crate depends on this one. It owns the
//! container-neutral [`TagSet`], the [`Error`] taxonomy, the
//! [`Lenient`] wrapper used by reads that degrade instead of failing, and the
//! [`events::EventBus`] the batch driver publishes on.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod lenient;
pub mod media;
pub mod tags;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, Rollback};
pub use ids::*;
pub use lenient::Lenient;
pub use media::*;
pub use tags::*;
