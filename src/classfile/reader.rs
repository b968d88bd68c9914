use super::error::{ClassFileError, Result};

/// Big-endian cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8> {
        let byte = *self.bytes.get(self.pos).ok_or(ClassFileError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16> {
        let raw = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32> {
        let raw = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub(crate) fn read_i4(&mut self) -> Result<i32> {
        Ok(self.read_u4()? as i32)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(ClassFileError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ClassFileError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_values() {
        let mut reader = Reader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0x07]);
        assert_eq!(reader.read_u4().unwrap(), 0xCAFEBABE);
        assert_eq!(reader.read_u2().unwrap(), 52);
        assert_eq!(reader.position(), 6);
        assert_eq!(reader.read_u1().unwrap(), 7);
        assert!(reader.is_empty());
        assert_eq!(reader.read_u1(), Err(ClassFileError::UnexpectedEof));
    }

    #[test]
    fn read_past_end_does_not_advance() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u4(), Err(ClassFileError::UnexpectedEof));
        assert_eq!(reader.read_u2().unwrap(), 0x0102);
    }
}
