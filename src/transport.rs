use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Byte stream the shield is reached over.
///
/// Reads block for at most the transport's own timeout. A read that times
/// out may surface either as `Ok(0)` or as an `io::ErrorKind::TimedOut` /
/// `WouldBlock` error; the helpers in this module treat all three as "no
/// byte".
pub trait Transport: Read + Write {
    /// Number of bytes that can be read right now without blocking.
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Drop anything waiting in the input buffer.
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Serial port transport, the one used against real hardware.
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.serial.name())
            .finish()
    }
}

impl SerialTransport {
    /// Open `port` at `baud_rate` with the given read timeout.
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, serialport::Error> {
        let serial = serialport::new(port, baud_rate).timeout(timeout).open()?;
        log::debug!("Opened {} at {} baud", port, baud_rate);
        Ok(Self { serial })
    }

    pub fn name(&self) -> Option<String> {
        self.serial.name()
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.serial.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.serial.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.serial.flush()
    }
}

impl Transport for SerialTransport {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.serial.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.serial.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Read one byte, mapping a timed-out read to `None`.
pub fn read_byte<T: Transport + ?Sized>(transport: &mut T) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match transport.read(&mut byte) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(byte[0])),
        Err(e) if is_timeout(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fill `buf` as far as the transport allows before a read times out.
/// Returns how many bytes were written into `buf`.
pub fn read_up_to<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match transport.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if is_timeout(&e) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read up to and including a `\n`, or whatever arrived before a timeout.
pub fn read_line<T: Transport + ?Sized>(transport: &mut T) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    while let Some(byte) = read_byte(transport)? {
        line.push(byte);
        if byte == b'\n' {
            break;
        }
    }
    Ok(line)
}

/// Strip trailing CR/LF bytes.
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |i| i + 1);
    &line[..end]
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Bytes(VecDeque<u8>),
    Silence,
}

/// In-memory transport that replays a script of incoming bytes and records
/// everything written to it.
///
/// A [`silence`](Self::silence) entry makes exactly one read time out, which
/// is how a quiet device looks from the host. Once the script runs dry every
/// read times out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    incoming: VecDeque<Chunk>,
    written: Vec<u8>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the host to read.
    pub fn push(&mut self, bytes: &[u8]) -> &mut Self {
        match self.incoming.back_mut() {
            Some(Chunk::Bytes(queued)) => queued.extend(bytes),
            _ => self.incoming.push_back(Chunk::Bytes(bytes.iter().copied().collect())),
        }
        self
    }

    /// Queue one timed-out read.
    pub fn silence(&mut self) -> &mut Self {
        self.incoming.push_back(Chunk::Silence);
        self
    }

    /// Everything the host has written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    /// True once every scripted byte and silence has been consumed.
    pub fn is_drained(&self) -> bool {
        self.incoming.is_empty()
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.incoming.front_mut() {
            Some(Chunk::Bytes(queued)) => {
                let n = buf.len().min(queued.len());
                for (slot, byte) in buf.iter_mut().zip(queued.drain(..n)) {
                    *slot = byte;
                }
                if queued.is_empty() {
                    self.incoming.pop_front();
                }
                Ok(n)
            }
            Some(Chunk::Silence) => {
                self.incoming.pop_front();
                Err(io::Error::new(io::ErrorKind::TimedOut, "scripted silence"))
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "script exhausted")),
        }
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(match self.incoming.front() {
            Some(Chunk::Bytes(queued)) => queued.len(),
            _ => 0,
        })
    }

    fn clear_input(&mut self) -> io::Result<()> {
        while matches!(self.incoming.front(), Some(Chunk::Bytes(_))) {
            self.incoming.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_maps_silence_to_none() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"a").silence().push(b"b");

        assert_eq!(read_byte(&mut transport).unwrap(), Some(b'a'));
        assert_eq!(read_byte(&mut transport).unwrap(), None);
        assert_eq!(read_byte(&mut transport).unwrap(), Some(b'b'));
        assert_eq!(read_byte(&mut transport).unwrap(), None);
        assert!(transport.is_drained());
    }

    #[test]
    fn test_pending_stops_at_silence() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"abc").silence().push(b"de");
        assert_eq!(transport.bytes_to_read().unwrap(), 3);

        let mut buf = [0u8; 7];
        assert_eq!(read_up_to(&mut transport, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(transport.bytes_to_read().unwrap(), 2);
    }

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"OK\r\nrest");

        assert_eq!(read_line(&mut transport).unwrap(), b"OK\r\n");
        assert_eq!(read_line(&mut transport).unwrap(), b"rest");
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"v:1.2\r\n"), b"v:1.2");
        assert_eq!(trim_line_ending(b"\r\n"), b"");
        assert_eq!(trim_line_ending(b"plain"), b"plain");
    }

    #[test]
    fn test_clear_input_keeps_later_chunks() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"junk").silence().push(b"x");
        transport.clear_input().unwrap();
        assert_eq!(read_byte(&mut transport).unwrap(), None);
        assert_eq!(read_byte(&mut transport).unwrap(), Some(b'x'));
    }

    #[test]
    fn test_records_writes() {
        let mut transport = ScriptedTransport::new();
        transport.write_all(&[0x85, 0x02]).unwrap();
        assert_eq!(transport.written(), &[0x85, 0x02]);
        assert_eq!(transport.take_written(), vec![0x85, 0x02]);
        assert!(transport.written().is_empty());
    }
}
