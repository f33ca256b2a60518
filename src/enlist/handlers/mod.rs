//! Route handlers.

pub mod health;
pub mod root;
pub mod signup;

pub use self::health::health;
pub use self::root::root;
pub use self::signup::{signup, SignupConfig, SignupError};
