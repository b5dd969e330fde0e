mod entity_serializer;
mod priority_policy;
mod role_resolver;
mod transport;

pub use entity_serializer::{EntitySerializer, SerializeError};
pub use priority_policy::PriorityPolicy;
pub use role_resolver::RoleResolver;
pub use transport::{Transport, TransportError};
