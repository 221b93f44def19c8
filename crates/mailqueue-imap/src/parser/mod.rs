//! Sans-I/O response parsing.
//!
//! - [`lexer`]: tokens over one complete response frame
//! - [`wire`]: the incremental `parse(buffer, mode)` contract the engine drives
//! - [`Response`] / [`UntaggedResponse`] / [`FetchItem`]: structured results
//!
//! ```
//! use mailqueue_imap::parser::wire::{self, Mode, Parsed};
//!
//! let buf = b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n";
//! match wire::parse(buf, Mode::Greeting) {
//!     Parsed::Ok { consumed, .. } => assert_eq!(consumed, buf.len()),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod fetch;
pub mod lexer;
mod response;
pub mod wire;

pub use fetch::{Address, Envelope, FetchItem};
pub use lexer::{Lexer, Token};
pub use response::{Response, ResponseParser, StatusItem, UntaggedResponse};
