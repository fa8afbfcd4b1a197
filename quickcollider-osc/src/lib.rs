//! OSC dispatch and subscription layer for QuickCollider.
//!
//! Inbound OSC messages are decoded on a listener thread and queued for the
//! processing context, where they are routed either to an application object's
//! attribute/operation (`/set/...`, `/invoke/...`) or to the subscription
//! manager (`/subscribe`, `/unsubscribe`, `/unsubscribeAll`). Subscribed
//! attribute changes and events are sent back to the subscribing peer.

pub mod dispatcher;
pub mod object;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod subscription;
pub mod transport;

pub use dispatcher::{DispatchError, Dispatcher, DEFAULT_MAX_INVOKE_ARGS};
pub use object::{Emitted, Emitter, ObjectArena, ObjectEvent, ObjectEventKind, OscObject};
pub use protocol::{Command, ProtocolError};
pub use registry::{DispatchNode, DispatchTable, Interface};
pub use server::{OscError, OscServer, ServerConfig};
pub use subscription::{Client, Notifier, Outbound, SubscriptionManager};
pub use transport::InboundMessage;

pub use quickcollider_types::{
    Address, AttributeInfo, EventInfo, MemberKind, ObjectId, OperationInfo, Value, ValueType,
};
