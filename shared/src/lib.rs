//! Wire-level building blocks shared by the server and anything that talks to it.
//!
//! - [`buffer`]: the framed byte buffer every packet is read from and written to
//! - [`protocol`]: login handshake constants, response codes and the
//!   credential block codec
//! - [`packets`]: game packets exchanged after login

pub mod buffer;
pub mod error;
pub mod packets;
pub mod protocol;

pub use buffer::{Frame, FramedBuffer};
pub use error::{BufferError, BufferResult};
pub use protocol::InitResponseCode;
