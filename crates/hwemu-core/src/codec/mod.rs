//! Text codec for request-response pairs.
//!
//! Pairs are configured as one line of text:
//!
//! ```text
//! deadbeef=cafe        synchronous: answer 0xCAFE to exactly 0xDEADBEEF
//! timer:2s=01          periodic: emit 0x01 every two seconds
//! ```
//!
//! The codec is pure and stateless.  Parsing is lenient about case and a
//! trailing newline; formatting always produces the canonical form.

pub mod duration;
pub mod pair;

pub use duration::{format_duration, parse_duration, DurationError};
pub use pair::{format_pair, parse_pair, CodecError, TIMER_PREFIX};
