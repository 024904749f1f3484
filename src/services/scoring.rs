/// Weighted overall compliance score.
///
/// overall = round(0.4 * structural + 0.3 * formatting + 0.3 * grammar)
///
/// Inputs are expected to be 0-100 (the analyzer's contract); no clamping is
/// performed here.
pub fn overall_score(structural: i32, formatting: i32, grammar: i32) -> i32 {
    (structural as f64 * 0.4 + formatting as f64 * 0.3 + grammar as f64 * 0.3).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_score_weighting() {
        // round(32 + 21 + 27) = 80
        assert_eq!(overall_score(80, 70, 90), 80);
        assert_eq!(overall_score(0, 0, 0), 0);
        assert_eq!(overall_score(100, 100, 100), 100);
        // round(26 + 21.6 + 20.4) = round(68.0)
        assert_eq!(overall_score(65, 72, 68), 68);
    }

    #[test]
    fn test_overall_score_rounds_half_up() {
        // 0.4*74 + 0.3*75 + 0.3*75 = 74.6
        assert_eq!(overall_score(74, 75, 75), 75);
        // 0.4*10 + 0.3*11 + 0.3*10 = 10.3
        assert_eq!(overall_score(10, 11, 10), 10);
    }

    #[test]
    fn test_weighting_holds_across_range() {
        for s in (0..=100).step_by(10) {
            for f in (0..=100).step_by(10) {
                for g in (0..=100).step_by(10) {
                    let expected =
                        (s as f64 * 0.4 + f as f64 * 0.3 + g as f64 * 0.3).round() as i32;
                    assert_eq!(overall_score(s, f, g), expected);
                    assert!((0..=100).contains(&overall_score(s, f, g)));
                }
            }
        }
    }

}
