pub mod priority;
pub mod visibility;

pub use priority::NameHashPriority;
pub use visibility::can_replicate_to;
