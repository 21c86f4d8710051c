//! Byte shuffle filter.
//!
//! Groups byte `j` of every element together: `out[j * n + i] = in[i * ts + j]`
//! for `n = len / ts` whole elements. Trailing bytes that do not form a whole
//! element are copied unchanged.

/// Byte-shuffle `input` for elements of `typesize` bytes.
pub fn shuffle(typesize: usize, input: &[u8]) -> Vec<u8> {
    let mut out = input.to_vec();
    if typesize <= 1 {
        return out;
    }
    let n = input.len() / typesize;
    for i in 0..n {
        for j in 0..typesize {
            out[j * n + i] = input[i * typesize + j];
        }
    }
    out
}

/// Invert [`shuffle`] into `out`, which must have the same length as `input`.
pub fn unshuffle_into(typesize: usize, input: &[u8], out: &mut [u8]) {
    debug_assert_eq!(input.len(), out.len());
    if typesize <= 1 {
        out.copy_from_slice(input);
        return;
    }
    let n = input.len() / typesize;
    for i in 0..n {
        for j in 0..typesize {
            out[i * typesize + j] = input[j * n + i];
        }
    }
    let whole = n * typesize;
    out[whole..].copy_from_slice(&input[whole..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_groups_bytes() {
        let input = [1, 2, 3, 4, 5, 6];
        assert_eq!(shuffle(2, &input), vec![1, 3, 5, 2, 4, 6]);
    }

    #[test]
    fn test_unshuffle_keeps_leftover_bytes() {
        let input = [1, 2, 3, 4, 5, 6, 7];
        let shuffled = shuffle(2, &input);
        assert_eq!(shuffled[6], 7);
        let mut out = [0u8; 7];
        unshuffle_into(2, &shuffled, &mut out);
        assert_eq!(out, input);
    }
}
