pub mod epoch;
pub mod session;
pub mod user;

pub use epoch::Epoch;
pub use session::{Session, SessionClaims};
pub use user::{BootstrapStatus, User};
