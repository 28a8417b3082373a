#![warn(clippy::todo, unused_qualifications)]

pub mod arena;
pub mod cache;

pub fn format_size<T>(value: T) -> humansize::SizeFormatter<T, humansize::FormatSizeOptions>
where
    T: humansize::ToF64 + humansize::Unsigned,
{
    humansize::SizeFormatter::new(value, humansize::BINARY)
}

/// Smallest power of two that is `>= n`.
///
/// `0` and `1` both map to `1`.
pub fn nearest_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// `ceil(log2(n))`, i.e. the exponent of [`nearest_power_of_two`].
pub fn power_of_two_exponent(n: usize) -> u32 {
    nearest_power_of_two(n).trailing_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_rounds_up_to_powers_of_two() {
        assert_eq!(nearest_power_of_two(0), 1);
        assert_eq!(nearest_power_of_two(1), 1);
        assert_eq!(nearest_power_of_two(5), 8);
        assert_eq!(nearest_power_of_two(64), 64);
        assert_eq!(nearest_power_of_two(65), 128);
    }

    #[test]
    fn it_computes_exponents() {
        assert_eq!(power_of_two_exponent(2), 1);
        assert_eq!(power_of_two_exponent(3), 2);
        assert_eq!(power_of_two_exponent(4), 2);
        assert_eq!(power_of_two_exponent(115), 7);
    }
}
