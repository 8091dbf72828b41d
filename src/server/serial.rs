use std::io::{self, ErrorKind, Read, Write};

use tracing::debug;

use crate::message::{FrameError, Message, HEADER_LEN};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to frame message: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to write to controller: {0}")]
    Io(#[from] io::Error),
}

pub trait SerialTransport {
    fn write(&mut self, message: &Message) -> Result<(), TransportError>;
}

/// Writes framed messages to the controller.
#[derive(Debug)]
pub struct SerialLink<W> {
    inner: W,
}

impl<W: Write> SerialLink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> SerialTransport for SerialLink<W> {
    fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        let frame = message.encode()?;
        self.inner.write_all(&frame)?;
        self.inner.flush()?;
        debug!(kind = %message.kind(), len = frame.len(), "Wrote frame");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("failed to read from controller: {0}")]
    Io(#[from] io::Error),
}

/// Reads framed messages sent by the controller.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns `Ok(None)` once the stream ends between frames.
    ///
    /// An unknown command code is reported after its payload has been consumed, so
    /// the reader stays aligned on frame boundaries.
    pub fn next_frame(&mut self) -> Result<Option<Message>, ReadError> {
        let mut header = [0u8; HEADER_LEN];
        if !self.fill(&mut header)? {
            return Ok(None);
        }
        let mut frame = vec![0u8; HEADER_LEN + header[1] as usize];
        frame[..HEADER_LEN].copy_from_slice(&header);
        if !self.fill(&mut frame[HEADER_LEN..])? {
            return Err(FrameError::Truncated {
                expected: frame.len(),
                actual: HEADER_LEN,
            }
            .into());
        }
        Ok(Some(Message::decode(&frame)?))
    }

    /// Fills `buf` completely, or returns `false` if the stream ended before any byte.
    fn fill(&mut self, buf: &mut [u8]) -> Result<bool, ReadError> {
        let mut read = 0;
        while read < buf.len() {
            match self.inner.read(&mut buf[read..]) {
                Ok(0) if read == 0 => return Ok(false),
                Ok(0) => {
                    return Err(FrameError::Truncated {
                        expected: buf.len(),
                        actual: read,
                    }
                    .into())
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::message::{CommandKind, ComputerStatus};

    #[test]
    fn link_writes_encoded_frames() {
        let mut link = SerialLink::new(Vec::new());
        link.write(&Message::status(ComputerStatus::Locked)).unwrap();
        link.write(&Message::password("pw")).unwrap();
        assert_eq!(
            link.into_inner(),
            vec![0x02, 0x01, 0x01, 0x01, 0x02, b'p', b'w']
        );
    }

    #[test]
    fn link_rejects_oversized_password_without_writing() {
        let mut link = SerialLink::new(Vec::new());
        let err = link.write(&Message::password(&"x".repeat(300))).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Frame(FrameError::PayloadTooLarge(300))
        ));
        assert!(link.into_inner().is_empty());
    }

    #[test]
    fn link_surfaces_io_failures() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = SerialLink::new(Broken)
            .write(&Message::status(ComputerStatus::Unlocked))
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn reader_yields_frames_then_eof() {
        let bytes = vec![
            0x01, 0x05, b'a', b'l', b'i', b'c', b'e', //
            0x02, 0x00, //
            0x03, 0x02, b'4', b'2',
        ];
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.kind(), CommandKind::Password);
        assert_eq!(first.payload(), b"alice");

        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(second.kind(), CommandKind::ComputerStatus);
        assert!(second.payload().is_empty());

        let third = reader.next_frame().unwrap().unwrap();
        assert_eq!(third.kind(), CommandKind::Uid);
        assert_eq!(third.payload(), b"42");

        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn reader_skips_over_unknown_frames() {
        let bytes = vec![0x09, 0x02, 0xaa, 0xbb, 0x03, 0x01, b'7'];
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert!(matches!(
            reader.next_frame(),
            Err(ReadError::Frame(FrameError::UnknownCommand(0x09)))
        ));
        let next = reader.next_frame().unwrap().unwrap();
        assert_eq!(next.kind(), CommandKind::Uid);
        assert_eq!(next.payload(), b"7");
    }

    #[test]
    fn reader_reports_truncated_frame() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x01, 0x04, b'a']));
        assert!(matches!(
            reader.next_frame(),
            Err(ReadError::Frame(FrameError::Truncated { .. }))
        ));
    }
}
