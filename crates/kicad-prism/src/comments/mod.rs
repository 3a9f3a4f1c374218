//! Per-project review comments.

pub mod model;
pub mod store;

pub use model::{
    Comment, CommentContext, CommentLocation, CommentReply, CommentStatus, CommentsFile,
    CommentsMeta,
};
pub use store::CommentStore;
