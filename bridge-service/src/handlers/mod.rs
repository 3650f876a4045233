pub mod bridge;

pub use bridge::{bootstrap_session, sign_out};
