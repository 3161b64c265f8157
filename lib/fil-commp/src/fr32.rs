use std::io::Read;

/// Raw bytes consumed per expansion quad: four 254-bit spans of source data.
pub const IN_BYTES_PER_QUAD: usize = 127;

/// Bytes produced per expansion quad: four 256-bit field elements.
pub const OUT_BYTES_PER_QUAD: usize = 128;

/// Reader adding two zero bits to each 254 bits of data read from the source.
///
/// 127 source bytes expand into 128 output bytes holding four field elements,
/// each with its two most significant bits cleared so the value stays below
/// the field modulus. A final group shorter than 127 bytes is zero-extended
/// before expansion, so any non-empty source expands to a whole number of
/// quads.
///
/// The expanded stream is produced lazily and can be consumed only once.
/// Read failures from the source are propagated unchanged.
pub struct Fr32Reader<R> {
    source: R,
    quad: [u8; IN_BYTES_PER_QUAD],
    expanded: [u8; OUT_BYTES_PER_QUAD],
    /// Bytes of `expanded` already handed out.
    pos: usize,
    /// Valid bytes in `expanded`.
    len: usize,
    bytes_read: u64,
    exhausted: bool,
}

impl<R: Read> Fr32Reader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            quad: [0; IN_BYTES_PER_QUAD],
            expanded: [0; OUT_BYTES_PER_QUAD],
            pos: 0,
            len: 0,
            bytes_read: 0,
            exhausted: false,
        }
    }

    /// Raw bytes consumed from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Releases the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Pulls the next quad out of the source, zero-extending a short final
    /// group. Returns the number of raw bytes actually read.
    fn fill_quad(&mut self) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < IN_BYTES_PER_QUAD {
            let read = self.source.read(&mut self.quad[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        self.bytes_read += filled as u64;
        if filled < IN_BYTES_PER_QUAD {
            self.exhausted = true;
            self.quad[filled..].fill(0);
        }

        Ok(filled)
    }
}

impl<R: Read> Read for Fr32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pos == self.len {
            if self.exhausted {
                return Ok(0);
            }

            let filled = self.fill_quad()?;
            if filled == 0 {
                return Ok(0);
            }

            expand_quad(&self.quad, &mut self.expanded);
            self.pos = 0;
            self.len = OUT_BYTES_PER_QUAD;
        }

        let available = self.len - self.pos;
        let wanted = buf.len().min(available);
        buf[..wanted].copy_from_slice(&self.expanded[self.pos..self.pos + wanted]);
        self.pos += wanted;

        Ok(wanted)
    }
}

/// Expands one 127-byte quad into four field elements.
///
/// The source is treated as a little-endian bit stream; each element carries
/// 254 source bits, left-shifted to make room for the two zero bits that cap
/// the previous element.
fn expand_quad(input: &[u8; IN_BYTES_PER_QUAD], output: &mut [u8; OUT_BYTES_PER_QUAD]) {
    // first element: straight copy, top two bits cleared
    output[..32].copy_from_slice(&input[..32]);
    output[31] &= 0b0011_1111;

    // second element: shifted left by the two bits spilled from the first
    for i in 32..64 {
        output[i] = (input[i] << 2) | (input[i - 1] >> 6);
    }
    output[63] &= 0b0011_1111;

    // third element: four spilled bits
    for i in 64..96 {
        output[i] = (input[i] << 4) | (input[i - 1] >> 4);
    }
    output[95] &= 0b0011_1111;

    // fourth element: six spilled bits, the last byte is the leftover six
    // bits of the quad and is zero-capped by construction
    for i in 96..127 {
        output[i] = (input[i] << 6) | (input[i - 1] >> 2);
    }
    output[127] = input[126] >> 2;
}
