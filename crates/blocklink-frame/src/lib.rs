//! Newline-delimited envelope framing for the blocklink bridge.
//!
//! Every message on the wire is one JSON object followed by `\n`:
//!
//! ```text
//! {"device":[{"G":"0","V":0,"D":1003,"DA":"VNO"}]}
//! {"ACK":[{"G":"0","V":0,"D":1003,"DA":"1.2.3"}]}
//! ```
//!
//! There is no length prefix, checksum or request id.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_envelope, encode_envelope, DeviceRecord, Envelope, ErrorIndicator, FrameConfig,
    Payload, DEFAULT_MAX_LINE_LEN, LINE_TERMINATOR,
};
pub use error::{FrameError, Result};
pub use reader::LineReader;
pub use writer::LineWriter;
