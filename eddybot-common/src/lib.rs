pub mod utils;

pub use mongodb;
pub use teloxide;
