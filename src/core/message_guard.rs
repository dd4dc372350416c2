//! Detects payloads shaped like a serialized Solana transaction message.
//!
//! Used by strict message signing so the message path cannot be used to
//! sign something the chain would accept as a transaction.

const PUBKEY_LEN: usize = 32;
const VERSION_PREFIX_MASK: u8 = 0x80;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u8(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        let end = self.pos.checked_add(n)?;
        if end > self.bytes.len() {
            return None;
        }
        self.pos = end;
        Some(())
    }

    /// Solana short-vec length: up to three 7-bit groups.
    fn compact_u16(&mut self) -> Option<usize> {
        let mut value: usize = 0;
        for i in 0..3 {
            let b = self.u8()?;
            value |= ((b & 0x7f) as usize) << (7 * i);
            if b & 0x80 == 0 {
                return (value <= u16::MAX as usize).then_some(value);
            }
        }
        None
    }

    fn skip_short_vec(&mut self, elem_len: usize) -> Option<usize> {
        let n = self.compact_u16()?;
        self.skip(n.checked_mul(elem_len)?)?;
        Some(n)
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// True when `bytes` parses completely as a legacy or v0 transaction message.
pub fn looks_like_transaction_message(bytes: &[u8]) -> bool {
    parse_message(bytes).unwrap_or(false)
}

fn parse_message(bytes: &[u8]) -> Option<bool> {
    let mut cur = Cursor::new(bytes);

    let first = *bytes.first()?;
    let versioned = first & VERSION_PREFIX_MASK != 0;
    if versioned {
        if first & !VERSION_PREFIX_MASK != 0 {
            return Some(false);
        }
        cur.u8()?;
    }

    let required_signatures = cur.u8()? as usize;
    let readonly_signed = cur.u8()? as usize;
    let _readonly_unsigned = cur.u8()?;
    if required_signatures == 0 || readonly_signed >= required_signatures {
        return Some(false);
    }

    let account_count = cur.skip_short_vec(PUBKEY_LEN)?;
    if account_count < required_signatures {
        return Some(false);
    }

    // recent blockhash
    cur.skip(PUBKEY_LEN)?;

    let instruction_count = cur.compact_u16()?;
    for _ in 0..instruction_count {
        let program_index = cur.u8()? as usize;
        if !versioned && program_index >= account_count {
            return Some(false);
        }
        cur.skip_short_vec(1)?;
        cur.skip_short_vec(1)?;
    }

    if versioned {
        let lookups = cur.compact_u16()?;
        for _ in 0..lookups {
            cur.skip(PUBKEY_LEN)?;
            cur.skip_short_vec(1)?;
            cur.skip_short_vec(1)?;
        }
    }

    Some(cur.is_done())
}
