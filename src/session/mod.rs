//! Session Layer
//!
//! - `machine`: session lifecycle reducer and the snapshot holder
//! - `interaction`: selection-to-move controller and highlight projection

pub mod interaction;
pub mod machine;

pub use interaction::{
    Highlights, InteractionController, OptionKind, PendingPromotion, SelectOutcome, ValidationError,
};
pub use machine::{
    reduce, Context, Effects, GameSession, Notice, NoticeLevel, SessionEvent, SessionMachine, SessionState,
    Transition,
};
