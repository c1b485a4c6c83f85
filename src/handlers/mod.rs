mod analyze;
mod auth;
mod health;

pub use analyze::analyze;
pub use auth::issue_token;
pub use health::health_check;
