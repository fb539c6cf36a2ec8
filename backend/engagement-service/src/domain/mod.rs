pub mod models;

pub use models::{
    Comment, CommentCreated, CounterDrift, Like, LikeState, Money, NewComment, NewStory, NewTip,
    Story, StoryStatus, Tip, TipInsert,
};
