//! In-memory doubles for host tests

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::protocol::opcode;
use crate::screens::{DisplayBackend, Line};

/// Serial port that answers sensor requests from a table of canned replies
#[derive(Default)]
pub struct MockSerial {
    pub rx: VecDeque<u8>,
    pub written: Vec<u8>,
    replies: Vec<(u8, Vec<u8>)>,
    awaiting_packet_id: bool,
    failing_reads: usize,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` whenever packet `packet_id` is requested
    pub fn reply_to(&mut self, packet_id: u8, reply: &[u8]) {
        self.replies.retain(|(id, _)| *id != packet_id);
        self.replies.push((packet_id, reply.to_vec()));
    }

    /// Push stray bytes onto the line
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Make the next `count` receive calls (`read_ready` or `read`) fail
    pub fn fail_reads(&mut self, count: usize) {
        self.failing_reads = count;
    }

    fn receive_fault(&mut self) -> Result<(), embedded_io::ErrorKind> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(embedded_io::ErrorKind::Other);
        }
        Ok(())
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.receive_fault()?;
        let n = self.rx.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap_or(0);
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.receive_fault()?;
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            self.written.push(byte);
            if self.awaiting_packet_id {
                self.awaiting_packet_id = false;
                if let Some((_, reply)) = self.replies.iter().find(|(id, _)| *id == byte) {
                    self.rx.extend(reply.iter().copied());
                }
            } else if byte == opcode::SENSORS {
                self.awaiting_packet_id = true;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Wake line that records every level it was driven to (`false` = low)
#[derive(Default)]
pub struct MockWakeLine {
    pub levels: Vec<bool>,
    /// Every level change fails while set
    pub broken: bool,
}

impl embedded_hal::digital::ErrorType for MockWakeLine {
    type Error = embedded_hal::digital::ErrorKind;
}

impl embedded_hal::digital::OutputPin for MockWakeLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(embedded_hal::digital::ErrorKind::Other);
        }
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(embedded_hal::digital::ErrorKind::Other);
        }
        self.levels.push(true);
        Ok(())
    }
}

/// RAM-backed NOR flash: erase sets 0xFF, writes can only clear bits
pub struct MockFlash {
    pub data: Vec<u8>,
    /// Erase and write fail while set, reads keep working
    pub write_protected: bool,
}

pub const MOCK_FLASH_SIZE: usize = 16 * 1024;

impl MockFlash {
    pub fn new() -> Self {
        Self {
            data: std::vec![0xFF; MOCK_FLASH_SIZE],
            write_protected: false,
        }
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if self.write_protected {
            return Err(NorFlashErrorKind::Other);
        }
        let (from, to) = (from as usize, to as usize);
        if from % Self::ERASE_SIZE != 0 || to % Self::ERASE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if to > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        self.data[from..to].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.write_protected {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        if start % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if start + bytes.len() > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        for (cell, byte) in self.data[start..].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Display that keeps every frame it was asked to draw
#[derive(Default)]
pub struct MockDisplay {
    pub power_save: bool,
    pub power_save_calls: usize,
    pub frames: Vec<(String, Vec<String>)>,
}

impl MockDisplay {
    pub fn last_frame(&self) -> Option<&(String, Vec<String>)> {
        self.frames.last()
    }
}

impl DisplayBackend for MockDisplay {
    fn set_power_save(&mut self, enabled: bool) {
        self.power_save = enabled;
        self.power_save_calls += 1;
    }

    fn draw(&mut self, header: &str, lines: &[Line]) {
        self.frames.push((
            header.to_string(),
            lines.iter().map(|l| l.as_str().to_string()).collect(),
        ));
    }
}
