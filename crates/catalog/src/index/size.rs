//! The 13-bit lossy size-class encoding.
//!
//! Layout: a 3-bit exponent and a 10-bit mantissa, tuned for compact
//! human-readable formatting (`"1.50 KiB"`, `"250 MiB"`). The encoding is a
//! display-only approximation and must never drive capacity or allocation
//! decisions.

/// Encodes a byte size into the 13-bit size class.
///
/// Sizes of 1 MiB and up are first divided down by 1024 (exponent += 3 per
/// division). The remainder is then classified into one of four magnitude
/// bands selecting a 0-2 fractional-digit mantissa. The exponent saturates
/// at 7 with the mantissa pinned to 1023.
pub(crate) fn encode_bi_size(size: u32) -> u16 {
    let mut exponent: u32 = 0;
    let mut size = size;
    while size >= 1024 * 1024 {
        exponent += 3;
        size /= 1024;
    }
    if size >= 100 * 1024 {
        size /= 1024;
        exponent += 3;
    } else if size >= 10 * 1024 {
        size = size * 10 / 1024;
        exponent += 2;
    } else if size >= 1024 {
        size = size * 100 / 1024;
        exponent += 1;
    }
    if exponent > 7 {
        exponent = 7;
        size = 1023;
    }
    ((exponent << 10) + size) as u16
}

/// Formats a size class produced by [`encode_bi_size`].
///
/// `exponent mod 3` selects 0/1/2 fractional digits; `exponent / 3` selects
/// the unit suffix.
pub(crate) fn format_size_class(encoded: u16) -> String {
    const SUFFIX: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut exponent = usize::from((encoded >> 10) & 7);
    let size = u32::from(encoded & 1023);
    let mut suffix_idx = 0;
    while exponent >= 3 {
        suffix_idx += 1;
        exponent -= 3;
    }
    if exponent == 0 {
        return format!("{} {}", size, SUFFIX[suffix_idx]);
    }
    suffix_idx += 1;
    if exponent == 1 {
        let rem = size % 100;
        if rem == 0 {
            format!("{} {}", size / 100, SUFFIX[suffix_idx])
        } else {
            format!("{}.{:02} {}", size / 100, rem, SUFFIX[suffix_idx])
        }
    } else {
        let rem = size % 10;
        if rem == 0 {
            format!("{} {}", size / 10, SUFFIX[suffix_idx])
        } else {
            format!("{}.{} {}", size / 10, rem, SUFFIX[suffix_idx])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(size: u32) -> String {
        format_size_class(encode_bi_size(size))
    }

    #[test]
    fn common_sizes() {
        assert_eq!(fmt(1536), "1.50 KiB");
        assert_eq!(fmt(1048576), "1 MiB");
        assert_eq!(fmt(999), "999 B");
    }

    #[test]
    fn bands() {
        assert_eq!(fmt(0), "0 B");
        assert_eq!(fmt(1023), "1023 B");
        assert_eq!(fmt(1024), "1 KiB");
        assert_eq!(fmt(50 * 1024), "50 KiB");
        assert_eq!(fmt(51 * 1024 + 512), "51.5 KiB");
        assert_eq!(fmt(200 * 1024), "200 KiB");
        assert_eq!(fmt(3 * 1024 * 1024 / 2), "1.50 MiB");
        assert_eq!(fmt(2 * 1024 * 1024 * 1024), "2 GiB");
    }

    #[test]
    fn saturates_at_exponent_cap() {
        // Encodings cannot represent anything past "1023 GiB"-scale values.
        let encoded = encode_bi_size(u32::MAX);
        assert_eq!((encoded >> 10) & 7, 7);
    }

    #[test]
    fn fits_in_13_bits() {
        for size in [0, 1, 1023, 1024, 1536, 10 * 1024, 1 << 20, u32::MAX] {
            assert!(encode_bi_size(size) < (1 << 13));
        }
    }
}
