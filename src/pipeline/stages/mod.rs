//! The four spam-check stages, in pipeline order.

pub mod check_spam;
pub mod combine_results;
pub mod fetch_messages;
pub mod select_users;

pub use check_spam::CheckSpam;
pub use combine_results::CombineResults;
pub use fetch_messages::FetchMessages;
pub use select_users::SelectUsers;
