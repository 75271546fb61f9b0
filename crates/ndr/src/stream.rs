//! Sequential stub writer and reader
//!
//! Object implementations marshal their parameters one after another. These
//! wrappers keep the buffer, the stub offset and the byte order together.

use crate::{NdrContext, NdrDecode, NdrEncode, NdrError, Result};
use bytes::{Bytes, BytesMut};

/// Builds a stub from consecutive NDR values
#[derive(Debug, Default)]
pub struct NdrWriter {
    buf: BytesMut,
    position: usize,
    ctx: NdrContext,
}

impl NdrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(ctx: NdrContext) -> Self {
        Self { buf: BytesMut::new(), position: 0, ctx }
    }

    pub fn write<T: NdrEncode>(&mut self, value: &T) -> Result<&mut Self> {
        value.ndr_encode(&mut self.buf, &self.ctx, &mut self.position)?;
        Ok(self)
    }

    /// Pad to `alignment` without writing a value.
    pub fn align(&mut self, alignment: usize) -> &mut Self {
        self.ctx.pad(&mut self.buf, &mut self.position, alignment);
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads consecutive NDR values from a stub
#[derive(Debug)]
pub struct NdrReader<'a> {
    data: &'a [u8],
    position: usize,
    ctx: NdrContext,
}

impl<'a> NdrReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0, ctx: NdrContext::new() }
    }

    pub fn with_context(data: &'a [u8], ctx: NdrContext) -> Self {
        Self { data, position: 0, ctx }
    }

    pub fn read<T: NdrDecode>(&mut self) -> Result<T> {
        T::ndr_decode(&mut self.data, &self.ctx, &mut self.position)
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Fails if anything other than trailing alignment padding is left.
    pub fn finish(self) -> Result<()> {
        let padding = NdrContext::align_padding(self.position, 8);
        if self.data.len() > padding || self.data.iter().any(|b| *b != 0) {
            return Err(NdrError::TrailingData(self.data.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bstr;

    #[test]
    fn test_writer_reader_sequence() {
        let mut writer = NdrWriter::new();
        writer.write(&3u16).unwrap().write(&Bstr::new("hen")).unwrap();
        let stub = writer.into_bytes();

        let mut reader = NdrReader::new(&stub);
        assert_eq!(reader.read::<u16>().unwrap(), 3);
        assert_eq!(reader.read::<Bstr>().unwrap().as_str(), "hen");
        reader.finish().unwrap();
    }

    #[test]
    fn test_finish_rejects_leftover_values() {
        let mut writer = NdrWriter::new();
        writer.write(&1u32).unwrap().write(&2u32).unwrap();
        let stub = writer.into_bytes();

        let mut reader = NdrReader::new(&stub);
        reader.read::<u32>().unwrap();
        assert!(matches!(reader.finish(), Err(NdrError::TrailingData(4))));
    }
}
