//! Fixed-width big-endian encoding on top of any byte sink or source.
//!
//! Integers and floats use their natural width. Booleans are one byte (`0`/`1`, any non-zero
//! reads as `true`). Strings are a `u32` byte length followed by UTF-8 bytes.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::{DiskError, DiskReader, DiskWriter};

#[async_trait]
pub trait ByteSink: Send {
    async fn write(&mut self, bytes: Vec<u8>) -> Result<(), DiskError>;
}

#[async_trait]
pub trait ByteSource: Send {
    /// Up to `n` bytes; fewer only at end of stream.
    async fn read(&mut self, n: usize) -> Result<Vec<u8>, DiskError>;

    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, DiskError> {
        let bytes = self.read(n).await?;
        if bytes.len() < n {
            return Err(DiskError::UnexpectedEof {
                expected: n,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ByteSink for DiskWriter {
    async fn write(&mut self, bytes: Vec<u8>) -> Result<(), DiskError> {
        DiskWriter::write(self, bytes).await
    }
}

#[async_trait]
impl ByteSource for DiskReader {
    async fn read(&mut self, n: usize) -> Result<Vec<u8>, DiskError> {
        DiskReader::read(self, n).await
    }
}

#[async_trait]
impl ByteSink for Vec<u8> {
    async fn write(&mut self, bytes: Vec<u8>) -> Result<(), DiskError> {
        self.extend_from_slice(&bytes);
        Ok(())
    }
}

#[async_trait]
impl ByteSource for VecDeque<u8> {
    async fn read(&mut self, n: usize) -> Result<Vec<u8>, DiskError> {
        let take = n.min(self.len());
        Ok(self.drain(..take).collect())
    }
}

fn array<const N: usize>(bytes: Vec<u8>) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[async_trait]
pub trait TypedWrite: ByteSink {
    async fn write_u8(&mut self, value: u8) -> Result<(), DiskError> {
        self.write(vec![value]).await
    }

    async fn write_i8(&mut self, value: i8) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_u16(&mut self, value: u16) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_i16(&mut self, value: i16) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_u32(&mut self, value: u32) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_i32(&mut self, value: i32) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_u64(&mut self, value: u64) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_i64(&mut self, value: i64) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_f32(&mut self, value: f32) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_f64(&mut self, value: f64) -> Result<(), DiskError> {
        self.write(value.to_be_bytes().to_vec()).await
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), DiskError> {
        self.write(vec![u8::from(value)]).await
    }

    async fn write_utf8(&mut self, value: &str) -> Result<(), DiskError> {
        let prefix = length_prefix(value.len())?;
        let mut bytes = Vec::with_capacity(4 + value.len());
        bytes.extend_from_slice(&prefix);
        bytes.extend_from_slice(value.as_bytes());
        self.write(bytes).await
    }
}

#[async_trait]
pub trait TypedRead: ByteSource {
    async fn read_u8(&mut self) -> Result<u8, DiskError> {
        Ok(self.read_exact(1).await?[0])
    }

    async fn read_i8(&mut self) -> Result<i8, DiskError> {
        Ok(i8::from_be_bytes(array(self.read_exact(1).await?)))
    }

    async fn read_u16(&mut self) -> Result<u16, DiskError> {
        Ok(u16::from_be_bytes(array(self.read_exact(2).await?)))
    }

    async fn read_i16(&mut self) -> Result<i16, DiskError> {
        Ok(i16::from_be_bytes(array(self.read_exact(2).await?)))
    }

    async fn read_u32(&mut self) -> Result<u32, DiskError> {
        Ok(u32::from_be_bytes(array(self.read_exact(4).await?)))
    }

    async fn read_i32(&mut self) -> Result<i32, DiskError> {
        Ok(i32::from_be_bytes(array(self.read_exact(4).await?)))
    }

    async fn read_u64(&mut self) -> Result<u64, DiskError> {
        Ok(u64::from_be_bytes(array(self.read_exact(8).await?)))
    }

    async fn read_i64(&mut self) -> Result<i64, DiskError> {
        Ok(i64::from_be_bytes(array(self.read_exact(8).await?)))
    }

    async fn read_f32(&mut self) -> Result<f32, DiskError> {
        Ok(f32::from_be_bytes(array(self.read_exact(4).await?)))
    }

    async fn read_f64(&mut self) -> Result<f64, DiskError> {
        Ok(f64::from_be_bytes(array(self.read_exact(8).await?)))
    }

    async fn read_bool(&mut self) -> Result<bool, DiskError> {
        Ok(self.read_u8().await? != 0)
    }

    async fn read_utf8(&mut self) -> Result<String, DiskError> {
        let len = self.read_u32().await? as usize;
        let bytes = self.read_exact(len).await?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl<T: ByteSink + ?Sized> TypedWrite for T {}
impl<T: ByteSource + ?Sized> TypedRead for T {}

/// Big-endian u32 length prefix of a string body.
fn length_prefix(len: usize) -> Result<[u8; 4], DiskError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| DiskError::StringTooLong(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_limits() {
        assert_eq!(length_prefix(0).unwrap(), [0, 0, 0, 0]);
        assert_eq!(length_prefix(258).unwrap(), [0, 0, 1, 2]);
        assert_eq!(length_prefix(u32::MAX as usize).unwrap(), [0xFF; 4]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_string_is_rejected() {
        let len = u32::MAX as usize + 1;
        assert!(matches!(
            length_prefix(len),
            Err(DiskError::StringTooLong(n)) if n == len
        ));
    }

    #[tokio::test]
    async fn values_survive_the_wire() {
        let mut out = Vec::new();
        out.write_u8(u8::MAX).await.unwrap();
        out.write_i8(i8::MIN).await.unwrap();
        out.write_u16(0xBEEF).await.unwrap();
        out.write_i16(-2).await.unwrap();
        out.write_u32(u32::MAX).await.unwrap();
        out.write_i32(i32::MIN).await.unwrap();
        out.write_u64(u64::MAX).await.unwrap();
        out.write_i64(i64::MIN).await.unwrap();
        out.write_f32(-1.5).await.unwrap();
        out.write_f64(std::f64::consts::PI).await.unwrap();
        out.write_bool(true).await.unwrap();
        out.write_bool(false).await.unwrap();
        out.write_utf8("").await.unwrap();
        out.write_utf8("héllo, wörld").await.unwrap();

        let mut src: VecDeque<u8> = out.into();
        assert_eq!(src.read_u8().await.unwrap(), u8::MAX);
        assert_eq!(src.read_i8().await.unwrap(), i8::MIN);
        assert_eq!(src.read_u16().await.unwrap(), 0xBEEF);
        assert_eq!(src.read_i16().await.unwrap(), -2);
        assert_eq!(src.read_u32().await.unwrap(), u32::MAX);
        assert_eq!(src.read_i32().await.unwrap(), i32::MIN);
        assert_eq!(src.read_u64().await.unwrap(), u64::MAX);
        assert_eq!(src.read_i64().await.unwrap(), i64::MIN);
        assert_eq!(src.read_f32().await.unwrap(), -1.5);
        assert_eq!(src.read_f64().await.unwrap(), std::f64::consts::PI);
        assert!(src.read_bool().await.unwrap());
        assert!(!src.read_bool().await.unwrap());
        assert_eq!(src.read_utf8().await.unwrap(), "");
        assert_eq!(src.read_utf8().await.unwrap(), "héllo, wörld");
        assert!(src.is_empty());
    }

    #[tokio::test]
    async fn layout_is_big_endian() {
        let mut out = Vec::new();
        out.write_u32(1).await.unwrap();
        out.write_utf8("ab").await.unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 0, 0, 0, 2, b'a', b'b']);
    }

    #[tokio::test]
    async fn short_input_is_an_error() {
        let mut src: VecDeque<u8> = vec![0, 0, 1].into();
        let err = src.read_u32().await.unwrap_err();
        assert!(matches!(
            err,
            DiskError::UnexpectedEof {
                expected: 4,
                actual: 3
            }
        ));

        let mut src: VecDeque<u8> = vec![0, 0, 0, 9, b'x'].into();
        assert!(matches!(
            src.read_utf8().await,
            Err(DiskError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let mut src: VecDeque<u8> = vec![0, 0, 0, 2, 0xff, 0xfe].into();
        assert!(matches!(
            src.read_utf8().await,
            Err(DiskError::InvalidUtf8(_))
        ));
    }
}
