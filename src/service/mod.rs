//! Service layer
//!
//! Mutation protocol, pagination strategies, consistency fan-out and the
//! visibility rules, all operating on the shared `PostStore`.

pub mod mutation;
pub mod notify;
pub mod pagination;
pub mod post;
pub mod profile;
pub mod resolver;
pub mod visibility;

pub use mutation::{MutationCoordinator, MutationOutcome, MutationRecord};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use pagination::{CursorPager, LoadOutcome, PageWindow, RetryPolicy, ScrollThrottle};
pub use post::PostService;
pub use profile::{SliceWindow, WindowSlicer};
pub use resolver::{ConsistencyResolver, PostChange, PostUpdate};
pub use visibility::HiddenReason;
