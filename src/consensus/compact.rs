//! Compact ("nBits") target encoding
//!
//! A 32-bit float-like encoding of a 256-bit target: the top byte is the
//! size in bytes, the low 23 bits the mantissa and bit 23 a sign flag.

use primitive_types::U256;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// A decoded compact target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compact {
    pub target: U256,
    /// The sign bit was set on a nonzero mantissa
    pub negative: bool,
    /// The encoded value does not fit in 256 bits
    pub overflow: bool,
}

impl Compact {
    /// Usable as a proof-of-work target: positive, nonzero, no overflow
    pub fn is_valid_target(&self) -> bool {
        !self.negative && !self.overflow && !self.target.is_zero()
    }
}

/// Decode compact bits into a 256-bit target
///
/// Bits shifted past 256 are dropped; `overflow` reports that case.
pub fn decode(bits: u32) -> Compact {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    // Sign and overflow are judged on the mantissa after any right shift
    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size - 3))
    };

    let negative = word != 0 && bits & SIGN_BIT != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    Compact {
        target,
        negative,
        overflow,
    }
}

/// Encode a 256-bit target into compact bits
///
/// Precision beyond the 3-byte mantissa is truncated.
pub fn encode(target: &U256, negative: bool) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*target >> (8 * (size - 3))).low_u32()
    };

    // Keep the mantissa clear of the sign bit
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact |= (size as u32) << 24;
    if negative && compact & MANTISSA_MASK != 0 {
        compact |= SIGN_BIT;
    }
    compact
}

/// Round a target through the compact encoding
pub fn round(target: &U256) -> U256 {
    decode(encode(target, false)).target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_decode(bits: u32, target: U256, negative: bool, overflow: bool) {
        let decoded = decode(bits);
        assert_eq!(decoded.target, target, "bits {:#010x}", bits);
        assert_eq!(decoded.negative, negative, "bits {:#010x}", bits);
        assert_eq!(decoded.overflow, overflow, "bits {:#010x}", bits);
    }

    #[test]
    fn test_decode_zero_mantissa() {
        let cases: [u32; 11] = [
            0, 0x00123456, 0x01003456, 0x02000056, 0x03000000, 0x04000000,
            0x00923456, 0x01803456, 0x02800056, 0x03800000, 0x04800000,
        ];
        for bits in cases {
            check_decode(bits, U256::zero(), false, false);
            assert_eq!(encode(&decode(bits).target, false), 0);
        }
    }

    #[test]
    fn test_decode_small_sizes() {
        check_decode(0x01123456, U256::from(0x12), false, false);
        assert_eq!(encode(&U256::from(0x12), false), 0x01120000);

        check_decode(0x02123456, U256::from(0x1234), false, false);
        assert_eq!(encode(&U256::from(0x1234), false), 0x02123400);

        check_decode(0x03123456, U256::from(0x123456), false, false);
        assert_eq!(encode(&U256::from(0x123456), false), 0x03123456);

        check_decode(0x04123456, U256::from(0x12345600u64), false, false);
        assert_eq!(encode(&U256::from(0x12345600u64), false), 0x04123456);
    }

    #[test]
    fn test_sign_bit_in_mantissa_bumps_size() {
        check_decode(0x01fedcba, U256::from(0x7e), true, false);
        assert_eq!(encode(&U256::from(0x7e), true), 0x01fe0000);

        // 0x80 would collide with the sign bit at size 1
        check_decode(0x02008000, U256::from(0x80), false, false);
        assert_eq!(encode(&U256::from(0x80), false), 0x02008000);

        check_decode(0x04923456, U256::from(0x12345600u64), true, false);
        assert_eq!(encode(&U256::from(0x12345600u64), true), 0x04923456);
    }

    #[test]
    fn test_decode_large() {
        let expected = U256::from(0x123456) << (8 * (0x20 - 3));
        check_decode(0x20123456, expected, false, false);
        assert_eq!(encode(&expected, false), 0x20123456);

        check_decode(0x05009234, U256::from(0x92340000u64), false, false);
        assert_eq!(encode(&U256::from(0x92340000u64), false), 0x05009234);
    }

    #[test]
    fn test_decode_overflow() {
        assert!(decode(0xff123456).overflow);
        assert!(decode(0x23000001).overflow);
        assert!(!decode(0x22000001).overflow);
        assert!(decode(0x22000100).overflow);
        assert!(!decode(0x21000100).overflow);
        assert!(decode(0x21010000).overflow);
        assert!(!decode(0x20010000).overflow);
        // A zero mantissa never overflows
        assert!(!decode(0xff000000).overflow);
    }

    #[test]
    fn test_pow_limit_encoding() {
        let limit = U256::MAX >> 20;
        assert_eq!(encode(&limit, false), 0x1e0fffff);
        assert_eq!(round(&limit), U256::from(0x0fffff) << 216);
    }

    #[test]
    fn test_is_valid_target() {
        assert!(decode(0x1e0fffff).is_valid_target());
        assert!(!decode(0).is_valid_target());
        assert!(!decode(0x1e8fffff).is_valid_target());
        assert!(!decode(0xff123456).is_valid_target());
    }
}
