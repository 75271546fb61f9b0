//! NDR (Network Data Representation) runtime
//!
//! Encoding support for the stub data carried by ORPC requests and responses.
//! Every value is written at an offset relative to the start of the stub, and
//! alignment is computed from that offset:
//!
//! - Primitives align to their natural size (1, 2, 4 or 8 bytes)
//! - GUIDs align to 4 and are written as `u32, u16, u16, [u8; 8]`
//! - Wide strings are conformant varying arrays of UTF-16 code units
//! - BSTRs travel as a user-marshaled `FLAGGED_WORD_BLOB`
//! - Unique pointers are a 4-byte referent id followed by the pointee

mod arrays;
mod codec;
mod context;
mod error;
mod pointers;
mod primitives;
mod stream;
mod strings;

pub use arrays::ConformantBytes;
pub use codec::{NdrDecode, NdrEncode};
pub use context::NdrContext;
pub use error::{NdrError, Result, MAX_NDR_ALLOCATION_SIZE};
pub use pointers::Unique;
pub use stream::{NdrReader, NdrWriter};
pub use strings::{Bstr, WideString};

pub use bytes::{Buf, BufMut, Bytes, BytesMut};
