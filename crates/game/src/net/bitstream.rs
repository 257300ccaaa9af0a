use crate::constants::MAX_STRING_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("stream overflow: needed {needed} bits, {available} available")]
    Overflow { needed: usize, available: usize },
    #[error("value {value} outside range [{min}, {max}]")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },
    #[error("non-zero alignment padding")]
    Alignment,
    #[error("string exceeds maximum length")]
    StringTooLong,
    #[error("invalid utf-16 string")]
    InvalidString,
}

/// Number of bits needed to store every value in `0..=range`.
#[inline]
pub const fn bits_required(range: u32) -> u32 {
    32 - range.leading_zeros()
}

#[inline]
const fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Packs values of arbitrary bit width, least significant bit first.
#[derive(Debug)]
pub struct BitWriter {
    data: Vec<u8>,
    scratch: u64,
    scratch_bits: u32,
    bits_written: usize,
    capacity_bits: usize,
}

impl BitWriter {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity_bytes),
            scratch: 0,
            scratch_bits: 0,
            bits_written: 0,
            capacity_bits: capacity_bytes * 8,
        }
    }

    pub fn bits_written(&self) -> usize {
        self.bits_written
    }

    pub fn bytes_written(&self) -> usize {
        self.bits_written.div_ceil(8)
    }

    pub fn bits_available(&self) -> usize {
        self.capacity_bits - self.bits_written
    }

    pub fn write_bits(&mut self, value: u32, bits: u32) -> Result<(), StreamError> {
        debug_assert!((1..=32).contains(&bits));
        if self.bits_written + bits as usize > self.capacity_bits {
            return Err(StreamError::Overflow {
                needed: bits as usize,
                available: self.bits_available(),
            });
        }

        let value = value as u64 & mask(bits);
        self.scratch |= value << self.scratch_bits;
        self.scratch_bits += bits;
        self.bits_written += bits as usize;

        while self.scratch_bits >= 8 {
            self.data.push(self.scratch as u8);
            self.scratch >>= 8;
            self.scratch_bits -= 8;
        }

        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), StreamError> {
        self.write_bits(value as u32, 1)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write_bits(value as u32, 8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), StreamError> {
        self.write_bits(value as u32, 16)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), StreamError> {
        self.write_bits(value, 32)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), StreamError> {
        self.write_bits(value as u32, 32)?;
        self.write_bits((value >> 32) as u32, 32)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), StreamError> {
        self.write_bits(value.to_bits(), 32)
    }

    pub fn write_int(&mut self, value: i32, min: i32, max: i32) -> Result<(), StreamError> {
        debug_assert!(min < max);
        if value < min || value > max {
            return Err(StreamError::ValueOutOfRange {
                value: value as i64,
                min: min as i64,
                max: max as i64,
            });
        }
        let range = (max as i64 - min as i64) as u32;
        let bits = bits_required(range);
        self.write_bits((value as i64 - min as i64) as u32, bits)
    }

    pub fn write_unsigned(&mut self, value: u32, min: u32, max: u32) -> Result<(), StreamError> {
        debug_assert!(min < max);
        if value < min || value > max {
            return Err(StreamError::ValueOutOfRange {
                value: value as i64,
                min: min as i64,
                max: max as i64,
            });
        }
        self.write_bits(value - min, bits_required(max - min))
    }

    pub fn write_align(&mut self) -> Result<(), StreamError> {
        let remainder = (8 - self.bits_written % 8) % 8;
        if remainder > 0 {
            self.write_bits(0, remainder as u32)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.write_align()?;
        for &byte in bytes {
            self.write_u8(byte)?;
        }
        Ok(())
    }

    /// Length-prefixed UTF-16, one 16-bit word per code unit.
    pub fn write_string(&mut self, value: &str) -> Result<(), StreamError> {
        let units: Vec<u16> = value.encode_utf16().collect();
        if units.len() > MAX_STRING_LENGTH {
            return Err(StreamError::StringTooLong);
        }
        self.write_unsigned(units.len() as u32, 0, MAX_STRING_LENGTH as u32)?;
        for unit in units {
            self.write_u16(unit)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.scratch_bits > 0 {
            self.data.push(self.scratch as u8);
        }
        self.data
    }
}

#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    scratch: u64,
    scratch_bits: u32,
    byte_index: usize,
    bits_read: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            scratch: 0,
            scratch_bits: 0,
            byte_index: 0,
            bits_read: 0,
        }
    }

    pub fn bits_read(&self) -> usize {
        self.bits_read
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bits_read
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u32, StreamError> {
        debug_assert!((1..=32).contains(&bits));
        if bits as usize > self.bits_remaining() {
            return Err(StreamError::Overflow {
                needed: bits as usize,
                available: self.bits_remaining(),
            });
        }

        while self.scratch_bits < bits {
            self.scratch |= (self.data[self.byte_index] as u64) << self.scratch_bits;
            self.byte_index += 1;
            self.scratch_bits += 8;
        }

        let value = (self.scratch & mask(bits)) as u32;
        self.scratch >>= bits;
        self.scratch_bits -= bits;
        self.bits_read += bits as usize;

        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        self.read_bits(32)
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        let low = self.read_bits(32)? as u64;
        let high = self.read_bits(32)? as u64;
        Ok(low | (high << 32))
    }

    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    pub fn read_int(&mut self, min: i32, max: i32) -> Result<i32, StreamError> {
        debug_assert!(min < max);
        let range = (max as i64 - min as i64) as u32;
        let raw = self.read_bits(bits_required(range))?;
        let value = min as i64 + raw as i64;
        if value > max as i64 {
            return Err(StreamError::ValueOutOfRange {
                value,
                min: min as i64,
                max: max as i64,
            });
        }
        Ok(value as i32)
    }

    pub fn read_unsigned(&mut self, min: u32, max: u32) -> Result<u32, StreamError> {
        debug_assert!(min < max);
        let raw = self.read_bits(bits_required(max - min))?;
        let value = min as i64 + raw as i64;
        if value > max as i64 {
            return Err(StreamError::ValueOutOfRange {
                value,
                min: min as i64,
                max: max as i64,
            });
        }
        Ok(value as u32)
    }

    pub fn read_align(&mut self) -> Result<(), StreamError> {
        let remainder = (8 - self.bits_read % 8) % 8;
        if remainder > 0 && self.read_bits(remainder as u32)? != 0 {
            return Err(StreamError::Alignment);
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, StreamError> {
        self.read_align()?;
        if len * 8 > self.bits_remaining() {
            return Err(StreamError::Overflow {
                needed: len * 8,
                available: self.bits_remaining(),
            });
        }
        (0..len).map(|_| self.read_u8()).collect()
    }

    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let len = self.read_unsigned(0, MAX_STRING_LENGTH as u32)? as usize;
        let units = (0..len)
            .map(|_| self.read_u16())
            .collect::<Result<Vec<u16>, _>>()?;
        String::from_utf16(&units).map_err(|_| StreamError::InvalidString)
    }
}
