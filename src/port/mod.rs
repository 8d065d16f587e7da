//! Byte-I/O provider layer.
//!
//! The engine talks to hardware only through the [`ByteIo`] trait. Backends
//! report asynchronous completions through a [`LinkEvents`] handle handed to
//! them on `open`.

pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;

pub use error::PortError;
pub use mock::MockLink;
pub use serial::{SerialLink, SerialSettings};
pub use traits::*;
