pub mod login;
pub mod tokens;

pub use login::{AuthService, Registration};
pub use tokens::{Session, SessionEvent, TokenStore, UserIdentity};
