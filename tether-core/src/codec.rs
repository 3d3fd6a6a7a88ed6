//! String codec between host text and guest UTF-8 bytes.
//!
//! Decoding is strict: malformed bytes from the guest are an error, never
//! silently replaced. Encoding writes straight into guest-allocated memory in
//! two phases. The ASCII prefix is copied into an allocation sized to the
//! text's unit count; on the first non-ASCII unit the allocation is grown to the
//! worst case for the remaining units and the rest is encoded in place. The
//! returned length is the exact number of bytes written.

use crate::error::{BridgeError, Result};
use crate::guest::{GuestMemory, GuestSlice};
use std::borrow::Cow;

/// Host text in some native representation.
pub trait HostText {
    /// Most UTF-8 bytes a single unit of this representation can expand to.
    const MAX_UTF8_PER_UNIT: usize;

    /// Number of units (bytes for `str`, code units for UTF-16).
    fn unit_len(&self) -> usize;

    /// The unit at `index` when it is an ASCII code point.
    fn ascii_unit(&self, index: usize) -> Option<u8>;

    /// Encode units `from..` as UTF-8 into `out`, returning bytes written.
    ///
    /// `out` holds at least `(unit_len - from) * MAX_UTF8_PER_UNIT` bytes.
    fn encode_tail(&self, from: usize, out: &mut [u8]) -> usize;

    /// Full UTF-8 encoding, used when the guest cannot reallocate.
    fn to_utf8(&self) -> Cow<'_, [u8]>;
}

impl HostText for str {
    // Already UTF-8: the unit count is the exact byte count.
    const MAX_UTF8_PER_UNIT: usize = 1;

    fn unit_len(&self) -> usize {
        self.len()
    }

    fn ascii_unit(&self, index: usize) -> Option<u8> {
        self.as_bytes().get(index).copied().filter(u8::is_ascii)
    }

    fn encode_tail(&self, from: usize, out: &mut [u8]) -> usize {
        let tail = &self.as_bytes()[from..];
        out[..tail.len()].copy_from_slice(tail);
        tail.len()
    }

    fn to_utf8(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl HostText for [u16] {
    // One UTF-16 unit is at most three UTF-8 bytes; a surrogate pair is four
    // bytes over two units.
    const MAX_UTF8_PER_UNIT: usize = 3;

    fn unit_len(&self) -> usize {
        self.len()
    }

    fn ascii_unit(&self, index: usize) -> Option<u8> {
        match self.get(index) {
            Some(&unit) if unit < 0x80 => Some(unit as u8),
            _ => None,
        }
    }

    fn encode_tail(&self, from: usize, out: &mut [u8]) -> usize {
        let mut written = 0;
        for ch in char::decode_utf16(self[from..].iter().copied()) {
            // Lone surrogates become U+FFFD, as `TextEncoder.encodeInto` does.
            let ch = ch.unwrap_or(char::REPLACEMENT_CHARACTER);
            written += ch.encode_utf8(&mut out[written..]).len();
        }
        written
    }

    fn to_utf8(&self) -> Cow<'_, [u8]> {
        Cow::Owned(String::from_utf16_lossy(self).into_bytes())
    }
}

/// Decode `len` bytes at `ptr` in guest memory as strict UTF-8.
///
/// A zero-length range returns an empty string without touching memory.
pub fn decode<G: GuestMemory + ?Sized>(guest: &mut G, ptr: u32, len: u32) -> Result<String> {
    if len == 0 {
        return Ok(String::new());
    }
    let view = guest.bytes();
    let bytes = view.slice(ptr, len)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| BridgeError::InvalidUtf8 {
            ptr,
            len,
            cause: e.to_string(),
        })
}

/// Encode `text` into newly allocated guest memory.
pub fn encode<T, G>(text: &T, guest: &mut G) -> Result<GuestSlice>
where
    T: HostText + ?Sized,
    G: GuestMemory + ?Sized,
{
    let units = text.unit_len();
    if units == 0 {
        return Ok(GuestSlice::empty());
    }

    if !guest.supports_realloc() {
        let utf8 = text.to_utf8();
        return guest.copy_to_guest(&utf8);
    }

    let len = guest_len(units)?;
    let mut ptr = guest.malloc(len)?;

    let mut offset = 0usize;
    {
        let mut view = guest.bytes();
        let dest = view.slice_mut(ptr, len)?;
        while let Some(byte) = text.ascii_unit(offset) {
            dest[offset] = byte;
            offset += 1;
        }
    }

    if offset == units {
        return Ok(GuestSlice::new(ptr, len));
    }

    let capacity = guest_len(offset + (units - offset) * T::MAX_UTF8_PER_UNIT)?;
    if capacity != len {
        ptr = guest.realloc(ptr, len, capacity)?;
    }

    let written = {
        let mut view = guest.bytes();
        let dest = view.slice_mut(ptr + offset as u32, capacity - offset as u32)?;
        text.encode_tail(offset, dest)
    };

    let total = guest_len(offset + written)?;
    if total != capacity {
        ptr = guest.realloc(ptr, capacity, total)?;
    }

    tracing::trace!(
        ptr,
        ascii_prefix = offset,
        len = total,
        "encoded non-ASCII text into guest memory"
    );
    Ok(GuestSlice::new(ptr, total))
}

fn guest_len(units: usize) -> Result<u32> {
    u32::try_from(units).map_err(|_| BridgeError::TextTooLarge { units })
}
