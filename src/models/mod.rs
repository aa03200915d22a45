mod catalog;
mod history;
mod recommendation;
mod user_context;

pub use catalog::*;
pub use history::*;
pub use recommendation::*;
pub use user_context::*;
