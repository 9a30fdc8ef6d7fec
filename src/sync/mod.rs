pub mod conversations;
pub mod messages;
pub mod poller;

pub use conversations::{ConversationListView, ConversationSync, RoleFilter};
pub use messages::{MessageSync, ThreadView};
pub use poller::Poller;

/// Load state shared by the list and thread views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Error,
}
