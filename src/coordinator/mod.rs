//! Session coordinator
//!
//! One `SessionCoordinator` per classroom visit. It owns device capture,
//! the media session, the signaling channel and the recording pipeline,
//! and folds their events into a single `ClassroomView`. `spawn` moves it
//! onto its own task behind a cloneable `SessionHandle`.

mod classroom;
mod events;
mod handle;
mod hands;
mod view;

pub use classroom::{Collaborators, SessionCoordinator};
pub use events::{ClassroomEvent, CoordinatorPhase};
pub use handle::SessionHandle;
pub use hands::HandRaiseSet;
pub use view::{ClassroomView, ParticipantView};
