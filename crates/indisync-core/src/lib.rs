// indisync-core: Device property model, single-writer store and session engine.

pub mod blob;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod session;
pub mod snapshot;
pub mod snoop;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use blob::{BlobPolicy, BlobPolicyTable};
pub use config::SessionConfig;
pub use error::CoreError;
pub use event::{EventType, Notification, Origin};
pub use session::{
    DetachedTransport, DeviceHandler, MemoryTransport, ProtocolMessage, Session, SessionBuilder,
    SessionContext, Transport, UpdateSender,
};
pub use snapshot::Snapshot;
pub use snoop::{SnoopRegistry, SnoopTarget};
pub use store::PropertyStore;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Containers
    Device, Member, Vector,
    // Values
    BlobValue, MemberInput, MemberKind, MemberValue, NumberValue, PropertyState, SwitchState,
    // Vector attributes
    Permission, SwitchRule, VectorKind,
    // Messages
    Message, MessageLog,
};
