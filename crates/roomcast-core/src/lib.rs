//! # roomcast-core
//!
//! In-process message routing core for a multi-room chat service.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **UserRegistry** - user identities, display names, and per-user inboxes
//! - **RoomRegistry** - named rooms with admin-gated deletion
//! - **Room** - membership plus a bounded broadcast mailbox and a
//!   write-once cancellation signal
//! - **MessageDispatcher** - broadcast/private routing and per-room
//!   worker pools fanning messages out to member inboxes
//!
//! All state is volatile process memory. The transport layer (HTTP,
//! SSE, or anything else) lives outside this crate: it calls the
//! dispatcher and registries, and drains each user's inboxes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ MessageDispatcher│────▶│    Room     │
//! └─────────────┘     └──────────────────┘     │ (queue+pool)│
//!        ▲                     │               └─────────────┘
//!        │                     ▼                      │
//!   drains inboxes     ┌──────────────┐        fans out to
//!        └─────────────│ UserRegistry │◀──── member inboxes
//!                      └──────────────┘
//! ```
//!
//! Delivery is best-effort: enqueues never block, and a saturated queue
//! drops the message instead of stalling its producer.

pub mod dispatcher;
pub mod error;
pub mod inbox;
pub mod message;
pub mod room;
pub mod rooms;
pub mod user;

pub use dispatcher::{DispatcherConfig, DispatcherHandle, MessageDispatcher};
pub use error::{Entity, Error};
pub use inbox::{Inbox, PushError};
pub use message::Message;
pub use room::{MemberInfo, Room, RoomId};
pub use rooms::RoomRegistry;
pub use user::{User, UserId, UserRegistry};
