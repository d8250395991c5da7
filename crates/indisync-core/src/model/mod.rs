// ── Domain model ──
//
// Members live inside vectors, vectors inside devices. Ownership runs
// strictly downward; a vector names its device by string and lookups go
// through the owning store.

pub mod device;
pub mod member;
pub mod message;
pub mod number;
pub mod vector;

pub use device::Device;
pub use member::{
    BlobValue, Member, MemberInput, MemberKind, MemberValue, NumberValue, PropertyState,
    SwitchState,
};
pub use message::{DEFAULT_MESSAGE_CAPACITY, Message, MessageLog};
pub use number::{format_number, parse_number};
pub use vector::{Permission, SwitchRule, Vector, VectorKind};
