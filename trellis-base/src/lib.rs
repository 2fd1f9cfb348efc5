mod error;

pub use error::{corrupt, illegal_state, invalid_input, substrate, user, Error, ErrorKind, Result};
