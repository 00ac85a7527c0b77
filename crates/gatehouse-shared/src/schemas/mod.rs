pub mod conversation;
pub mod prompt;
pub mod push_event;
pub mod rule;
pub mod stream;

pub use conversation::*;
pub use prompt::*;
pub use push_event::*;
pub use rule::*;
pub use stream::*;
