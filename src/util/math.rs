//! Small numeric helpers shared across the tracker.

/// Returns true if `n` is a power of two (zero is not).
pub(crate) fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Rounds a floating-point coordinate to the nearest integer pixel.
pub(crate) fn round_to_pixel(value: f32) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::{is_power_of_two, round_to_pixel};

    #[test]
    fn power_of_two_detection() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(64));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(12));
    }

    #[test]
    fn rounding_is_symmetric() {
        assert_eq!(round_to_pixel(2.4), 2);
        assert_eq!(round_to_pixel(-2.4), -2);
        assert_eq!(round_to_pixel(2.6), 3);
    }
}
