//! Bit-granular sequential reader over a file or a memory region, with the
//! primitive decoders for the universal codes the format uses.
//!
//! The accumulator (`current`/`fill`) widens internally to a `u128` so a
//! 64-bit `read_int` never has to juggle a carry across the top-up loop; the
//! reference C decoder keeps a strict 64-bit accumulator and special-cases
//! the boundary instead. The extra headroom buys the same externally visible
//! behaviour without that bookkeeping, at the cost of the stated "fill < 64"
//! invariant holding only at public call boundaries rather than at every
//! intermediate step.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, OnceLock};

use crate::error::{GraphError, Result};
use crate::tables::BYTEMSB;

const FILE_BUFFER_SIZE: usize = 16 * 1024;

/// A shared, byte-addressable memory region: an owned buffer, a borrowed
/// caller-supplied buffer, or a memory-mapped file, all behind one handle so
/// `BitReader` doesn't need to care which.
pub type MemSource = Arc<dyn AsRef<[u8]> + Send + Sync>;

enum Source {
    File {
        file: File,
        buf: Vec<u8>,
        buf_pos: usize,
        buf_len: usize,
    },
    Memory { mem: MemSource, pos: usize },
}

/// A bit-level cursor over either a file (internally double-buffered) or an
/// in-memory byte region. Implements the six primitive decoders the format's
/// bitstream is built from: fixed-width integers, unary, gamma, zeta(k) and
/// nibble codes.
pub struct BitReader {
    source: Source,
    current: u128,
    fill: u32,
    total_bits_read: u64,
}

#[inline]
fn mask128(n: u32) -> u128 {
    if n == 0 {
        0
    } else if n >= 128 {
        u128::MAX
    } else {
        (1u128 << n) - 1
    }
}

impl BitReader {
    /// Opens a file-backed reader with a 16 KiB internal buffer.
    pub fn open_file(file: File) -> Self {
        BitReader {
            source: Source::File {
                file,
                buf: vec![0u8; FILE_BUFFER_SIZE],
                buf_pos: 0,
                buf_len: 0,
            },
            current: 0,
            fill: 0,
            total_bits_read: 0,
        }
    }

    /// Wraps an in-memory region. The region is shared, not copied; the
    /// reader never frees it (dropping the `Arc` handle is enough).
    pub fn map_memory(mem: MemSource) -> Self {
        BitReader {
            source: Source::Memory { mem, pos: 0 },
            current: 0,
            fill: 0,
            total_bits_read: 0,
        }
    }

    /// Releases the file-mode internal buffer. No-op for memory mode.
    pub fn close(&mut self) {
        if let Source::File { buf, .. } = &mut self.source {
            *buf = Vec::new();
        }
    }

    /// Total number of bits consumed so far.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.total_bits_read
    }

    /// Seeks to an absolute bit offset and resyncs the accumulator.
    pub fn position(&mut self, bit_offset: u64) -> Result<()> {
        let byte_idx = bit_offset / 8;
        let bit_in_byte = (bit_offset % 8) as u32;
        match &mut self.source {
            Source::Memory { mem, pos } => {
                if byte_idx as usize > mem.as_ref().as_ref().len() {
                    return Err(GraphError::IoError(
                        "position past end of memory region".into(),
                    ));
                }
                *pos = byte_idx as usize;
            }
            Source::File {
                file,
                buf_pos,
                buf_len,
                ..
            } => {
                file.seek(SeekFrom::Start(byte_idx)).map_err(GraphError::from)?;
                *buf_pos = 0;
                *buf_len = 0;
            }
        }
        self.current = 0;
        self.fill = 0;
        if bit_in_byte > 0 {
            if !self.try_refill_one_byte()? {
                return Err(GraphError::IoError(
                    "position past end of bitstream".into(),
                ));
            }
            let remaining = 8 - bit_in_byte;
            self.fill = remaining;
            self.current &= mask128(remaining);
        }
        self.total_bits_read = bit_offset;
        Ok(())
    }

    fn try_refill_one_byte(&mut self) -> Result<bool> {
        let byte = match &mut self.source {
            Source::Memory { mem, pos } => {
                let bytes = mem.as_ref().as_ref();
                if *pos >= bytes.len() {
                    return Ok(false);
                }
                let b = bytes[*pos];
                *pos += 1;
                b
            }
            Source::File {
                file,
                buf,
                buf_pos,
                buf_len,
            } => {
                if *buf_pos >= *buf_len {
                    let n = file.read(buf).map_err(GraphError::from)?;
                    if n == 0 {
                        return Ok(false);
                    }
                    *buf_len = n;
                    *buf_pos = 0;
                }
                let b = buf[*buf_pos];
                *buf_pos += 1;
                b
            }
        };
        self.current = (self.current << 8) | (byte as u128);
        self.fill += 8;
        Ok(true)
    }

    fn ensure_fill(&mut self, n: u32) -> Result<()> {
        while self.fill < n {
            if !self.try_refill_one_byte()? {
                return Err(GraphError::IoError(
                    "unexpected end of bitstream".into(),
                ));
            }
        }
        Ok(())
    }

    /// Reads the next bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<u64> {
        self.read_int(1)
    }

    /// Reads the next `len` bits (1 <= len <= 64) as an unsigned integer,
    /// MSB-first. `len == 0` is allowed and always returns 0 (used by the
    /// gamma decoder when its length prefix is itself zero).
    pub fn read_int(&mut self, len: u32) -> Result<u64> {
        debug_assert!(len <= 64, "read_int: len must be <= 64");
        if len == 0 {
            return Ok(0);
        }
        self.ensure_fill(len)?;
        let shift = self.fill - len;
        let bits = ((self.current >> shift) & mask128(len)) as u64;
        self.fill = shift;
        self.current &= mask128(self.fill);
        self.total_bits_read += len as u64;
        Ok(bits)
    }

    /// Peeks up to `n` bits without consuming them. Returns fewer than `n`
    /// bits only at end of stream.
    fn peek_up_to(&mut self, n: u32) -> Result<(u64, u32)> {
        while self.fill < n {
            if !self.try_refill_one_byte()? {
                break;
            }
        }
        let avail = self.fill.min(n);
        let shift = self.fill - avail;
        let bits = ((self.current >> shift) & mask128(avail)) as u64;
        Ok((bits, avail))
    }

    fn consume(&mut self, n: u32) {
        self.fill -= n;
        self.current &= mask128(self.fill);
        self.total_bits_read += n as u64;
    }

    /// Reads the number of leading 0-bits before the next 1-bit (which is
    /// consumed as the terminator).
    pub fn read_unary(&mut self) -> Result<u64> {
        let mut count: u64 = 0;
        loop {
            if self.fill == 0 && !self.try_refill_one_byte()? {
                return Err(GraphError::IoError(
                    "unexpected end of bitstream in unary code".into(),
                ));
            }
            let window = self.current & mask128(self.fill);
            if window == 0 {
                count += self.fill as u64;
                self.total_bits_read += self.fill as u64;
                self.fill = 0;
                self.current = 0;
                continue;
            }
            let msb_pos = if self.fill == 8 {
                BYTEMSB[window as usize] as u32
            } else {
                127 - window.leading_zeros()
            };
            let zeros = self.fill - 1 - msb_pos;
            count += zeros as u64;
            self.consume(zeros + 1);
            return Ok(count);
        }
    }

    fn decode_gamma_general(&mut self) -> Result<u64> {
        let msb = self.read_unary()?;
        debug_assert!(msb < 64);
        let tail = self.read_int(msb as u32)?;
        Ok(((1u64 << msb) | tail) - 1)
    }

    /// gamma-code: unary length prefix followed by that many raw bits.
    pub fn read_gamma(&mut self) -> Result<u64> {
        let (window, avail) = self.peek_up_to(16)?;
        if avail == 16 {
            let entry = gamma_table()[window as usize];
            if entry != 0 {
                let len = entry >> 16;
                let value = entry & 0xFFFF;
                self.consume(len);
                return Ok(value as u64);
            }
        }
        self.decode_gamma_general()
    }

    fn decode_zeta_general(&mut self, k: u32) -> Result<u64> {
        let h = self.read_unary()?;
        debug_assert!(h * k < 64);
        let left = 1u64 << (h * k);
        let nbits = h * k + k - 1;
        let m = self.read_int(nbits)?;
        if m < left {
            Ok(m + left - 1)
        } else {
            let b = self.read_bit()?;
            Ok((m << 1) + b - 1)
        }
    }

    /// zeta(k)-code, per the Boldi-Vigna definition.
    pub fn read_zeta(&mut self, k: u32) -> Result<u64> {
        if k == 3 {
            let (window, avail) = self.peek_up_to(16)?;
            if avail == 16 {
                let entry = zeta3_table()[window as usize];
                if entry != 0 {
                    let len = entry >> 16;
                    let value = entry & 0xFFFF;
                    self.consume(len);
                    return Ok(value as u64);
                }
            }
        }
        self.decode_zeta_general(k)
    }

    fn decode_delta_general(&mut self) -> Result<u64> {
        let msb = self.read_gamma()?;
        debug_assert!(msb < 64);
        let tail = self.read_int(msb as u32)?;
        Ok(((1u64 << msb) | tail) - 1)
    }

    /// delta-code: a gamma-coded length prefix followed by that many raw bits.
    pub fn read_delta(&mut self) -> Result<u64> {
        self.decode_delta_general()
    }

    /// Reads one value using the field's selected universal code.
    pub fn read_code(&mut self, code: crate::properties::Code) -> Result<u64> {
        use crate::properties::Code;
        match code {
            Code::Unary => self.read_unary(),
            Code::Gamma => self.read_gamma(),
            Code::Delta => self.read_delta(),
            Code::Zeta { k } => self.read_zeta(k),
            Code::Nibble => self.read_nibble(),
        }
    }

    /// nibble code: 1 continuation bit then 3 payload bits, repeated while
    /// the continuation bit is 0.
    pub fn read_nibble(&mut self) -> Result<u64> {
        let mut x: u64 = 0;
        loop {
            x <<= 3;
            let cont = self.read_bit()?;
            let payload = self.read_int(3)?;
            x |= payload;
            if cont == 1 {
                break;
            }
        }
        Ok(x)
    }

    /// Advances by `n` bits without materializing a value.
    pub fn skip(&mut self, mut n: u64) -> Result<()> {
        while n > 0 {
            let take = n.min(64) as u32;
            self.read_int(take)?;
            n -= take as u64;
        }
        Ok(())
    }

    /// Advances past `n` gamma-coded integers.
    pub fn skip_gammas(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.decode_gamma_general()?;
        }
        Ok(())
    }

    /// Advances past `n` delta-coded integers.
    pub fn skip_deltas(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.decode_delta_general()?;
        }
        Ok(())
    }
}

/// Builds a gamma fast-decode table by running the general decoder over
/// every possible 16-bit window, rather than re-deriving the bit arithmetic:
/// an entry is nonzero exactly when the general decoder, fed only those 16
/// bits, consumes all of them without running off the end.
fn build_gamma_table() -> Vec<u32> {
    let mut table = vec![0u32; 1 << 16];
    for (w, slot) in table.iter_mut().enumerate() {
        let bytes = [(w >> 8) as u8, (w & 0xFF) as u8];
        let mut br = BitReader::map_memory(Arc::new(bytes.to_vec()));
        if let Ok(value) = br.decode_gamma_general() {
            let len = br.tell() as u32;
            if len <= 16 && value <= 0xFFFF {
                *slot = (len << 16) | (value as u32);
            }
        }
    }
    table
}

fn build_zeta3_table() -> Vec<u32> {
    let mut table = vec![0u32; 1 << 16];
    for (w, slot) in table.iter_mut().enumerate() {
        let bytes = [(w >> 8) as u8, (w & 0xFF) as u8];
        let mut br = BitReader::map_memory(Arc::new(bytes.to_vec()));
        if let Ok(value) = br.decode_zeta_general(3) {
            let len = br.tell() as u32;
            if len <= 16 && value <= 0xFFFF {
                *slot = (len << 16) | (value as u32);
            }
        }
    }
    table
}

fn gamma_table() -> &'static [u32] {
    static TABLE: OnceLock<Vec<u32>> = OnceLock::new();
    TABLE.get_or_init(build_gamma_table)
}

fn zeta3_table() -> &'static [u32] {
    static TABLE: OnceLock<Vec<u32>> = OnceLock::new();
    TABLE.get_or_init(build_zeta3_table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(bits: &str) -> BitReader {
        // `bits` is a string of '0'/'1' characters, padded to a byte boundary.
        let mut padded = bits.to_string();
        while padded.len() % 8 != 0 {
            padded.push('0');
        }
        let bytes: Vec<u8> = padded
            .as_bytes()
            .chunks(8)
            .map(|chunk| {
                let mut b = 0u8;
                for &c in chunk {
                    b = (b << 1) | if c == b'1' { 1 } else { 0 };
                }
                b
            })
            .collect();
        BitReader::map_memory(Arc::new(bytes))
    }

    #[test]
    fn read_int_reads_msb_first() {
        let mut br = reader_over("00001101"); // 13 in 8 bits
        assert_eq!(br.read_int(8).unwrap(), 13);
    }

    #[test]
    fn read_unary_counts_leading_zeros() {
        let mut br = reader_over("0001"); // 3 zeros then terminator
        assert_eq!(br.read_unary().unwrap(), 3);
    }

    #[test]
    fn read_gamma_zero() {
        let mut br = reader_over("1"); // gamma(0) is a single 1 bit
        assert_eq!(br.read_gamma().unwrap(), 0);
    }

    #[test]
    fn read_gamma_matches_general_and_table_paths() {
        // gamma(4): msb = floor(log2(5)) = 2, so unary(2) = "001", tail = 5-4 = 1 on 2 bits = "01"
        let mut br = reader_over("00101");
        assert_eq!(br.read_gamma().unwrap(), 4);
    }

    #[test]
    fn read_nibble_single_chunk() {
        // continuation=1 then payload=5 (101)
        let mut br = reader_over("1101");
        assert_eq!(br.read_nibble().unwrap(), 5);
    }

    #[test]
    fn skip_then_read_matches_read_then_read() {
        let mut a = reader_over("0000110100011");
        a.skip(8).unwrap();
        let tail_a = a.read_int(5).unwrap();

        let mut b = reader_over("0000110100011");
        b.read_int(8).unwrap();
        let tail_b = b.read_int(5).unwrap();

        assert_eq!(tail_a, tail_b);
    }

    #[test]
    fn position_resyncs_midbyte() {
        let mut br = reader_over("1100110010101010");
        br.position(4).unwrap();
        assert_eq!(br.read_int(4).unwrap(), 0b1100);
        assert_eq!(br.tell(), 8);
    }

    // A fixed 197-integer vector exercising every primitive code: five
    // fixed-width fields, then unary 0..63, then gamma 0,8,..,504, then
    // zeta(3) 0,8,..,504 — built from first principles rather than by hand,
    // since the encoder side of these codes lives only in this test.

    fn unary_str(n: u64) -> String {
        "0".repeat(n as usize) + "1"
    }

    fn bits_str(value: u64, width: u32) -> String {
        (0..width)
            .rev()
            .map(|i| if (value >> i) & 1 == 1 { '1' } else { '0' })
            .collect()
    }

    fn floor_log2(x: u64) -> u32 {
        63 - x.leading_zeros()
    }

    fn gamma_str(n: u64) -> String {
        let msb = floor_log2(n + 1);
        unary_str(msb as u64) + &bits_str(n + 1 - (1 << msb), msb)
    }

    fn zeta_str(n: u64, k: u32) -> String {
        let t = n + 1;
        let h = floor_log2(t) / k;
        let left = 1u64 << (h * k);
        let nbits = h * k + k - 1;
        if t <= 2 * left - 1 {
            unary_str(h as u64) + &bits_str(t - left, nbits)
        } else {
            let m = t >> 1;
            let b = t & 1;
            unary_str(h as u64) + &bits_str(m, nbits) + &bits_str(b, 1)
        }
    }

    fn bit_primitives_vector() -> (String, Vec<u64>) {
        let step: Vec<u64> = (0..64).map(|i| i * 8).collect();
        let mut bits = String::new();
        bits += &bits_str(13, 10);
        bits += &bits_str(4, 3);
        bits += &bits_str(3, 3);
        bits += &bits_str(45233, 16);
        bits += &bits_str(232584213, 30);
        for n in 0..64u64 {
            bits += &unary_str(n);
        }
        for &n in &step {
            bits += &gamma_str(n);
        }
        for &n in &step {
            bits += &zeta_str(n, 3);
        }
        (bits, step)
    }

    #[test]
    fn bit_primitives_fixed_vector_decodes_exactly() {
        let (bits, step) = bit_primitives_vector();
        let mut br = reader_over(&bits);

        assert_eq!(br.read_int(10).unwrap(), 13);
        assert_eq!(br.read_int(3).unwrap(), 4);
        assert_eq!(br.read_int(3).unwrap(), 3);
        assert_eq!(br.read_int(16).unwrap(), 45233);
        assert_eq!(br.read_int(30).unwrap(), 232584213);

        for expected in 0..64u64 {
            assert_eq!(br.read_unary().unwrap(), expected);
        }
        for &expected in &step {
            assert_eq!(br.read_gamma().unwrap(), expected);
        }
        for &expected in &step {
            assert_eq!(br.read_zeta(3).unwrap(), expected);
        }
    }

    #[test]
    fn position_and_skip_are_equivalent_to_sequential_reads() {
        let (bits, _) = bit_primitives_vector();

        // The three leading fixed-width fields are 10+3+3 = 16 bits; skipping
        // them should land exactly on the 16-bit field that follows.
        let mut skipped = reader_over(&bits);
        skipped.skip(16).unwrap();
        assert_eq!(skipped.read_int(16).unwrap(), 45233);

        // Bit 62 (10+3+3+16+30) is where the unary block starts.
        let mut positioned = reader_over(&bits);
        positioned.position(62).unwrap();
        for expected in 0..64u64 {
            assert_eq!(positioned.read_unary().unwrap(), expected);
        }
    }
}
