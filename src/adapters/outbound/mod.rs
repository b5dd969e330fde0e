mod channel_transport;
mod dashmap_role_resolver;
mod frame_serializer;

pub use channel_transport::{ChannelTransport, NullTransport, OutboundPayload};
pub use dashmap_role_resolver::DashMapRoleResolver;
pub use frame_serializer::{BodyEncoder, FrameSerializer};
