/// Converts a slice of 32 bytes into four native-endian words.
/// Returns None if the slice is not 32 bytes long.
pub fn byte_slice_to_words(bytes: &[u8]) -> Option<[u64; 4]> {
    let bytes: &[u8; 32] = bytes.try_into().ok()?;
    Some(byte_array_to_words(bytes))
}

pub fn byte_array_to_words(bytes: &[u8; 32]) -> [u64; 4] {
    let mut words = [0u64; 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut b = [0u8; 8];
        b.copy_from_slice(chunk);
        *word = u64::from_ne_bytes(b);
    }
    words
}

pub fn words_to_byte_array(words: &[u64; 4]) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (chunk, word) in bytes.chunks_exact_mut(8).zip(words) {
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    bytes
}

/// Split a 65-bit value into the low word and the carry bit, returning the carry as an all-ones/all-zeros mask.
#[inline(always)]
pub const fn split_carry_mask(x: u128) -> (u64, u64) {
    let carry = ((x >> 64) & 1) as u64;
    (x as u64, carry.wrapping_neg())
}

/// All-ones if `b` is false, all-zeros if `b` is true.
#[inline(always)]
pub const fn mask_if_false(b: bool) -> u64 {
    (b as u64).wrapping_sub(1)
}
