/// Frogeye severity tiering
///
/// Maps a leaf's lesion ratio and lesion count to a disease grade on the
/// 1-9 scale (1 most severe, 9 least). Only odd grades are produced.
///
/// Explicit bands are tried first; anything falling between them is graded
/// by the score `ratio * 10 + count / 20`.

/// Grades a leaf
///
/// # Example
///
/// ```
/// use mildew_engine::tier::distinguish_tier;
///
/// assert_eq!(distinguish_tier(0.01, 2), 9);
/// assert_eq!(distinguish_tier(0.7, 80), 1);
/// ```
pub fn distinguish_tier(lesion_ratio: f64, lesion_count: u32) -> u8 {
    let r = lesion_ratio;
    let n = lesion_count;

    if n >= 60 && r > 0.6 {
        1
    } else if n >= 40 && (0.4..=0.5).contains(&r) {
        3
    } else if n >= 20 && (0.2..0.4).contains(&r) {
        5
    } else if n >= 5 && (0.05..0.2).contains(&r) {
        7
    } else if n < 5 && r < 0.05 {
        9
    } else {
        let score = r * 10.0 + n as f64 / 20.0;
        if score >= 6.0 {
            1
        } else if score >= 4.0 {
            3
        } else if score >= 2.5 {
            5
        } else if score >= 1.5 {
            7
        } else {
            9
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_bands() {
        assert_eq!(distinguish_tier(0.61, 60), 1);
        assert_eq!(distinguish_tier(0.4, 40), 3);
        assert_eq!(distinguish_tier(0.5, 45), 3);
        assert_eq!(distinguish_tier(0.2, 20), 5);
        assert_eq!(distinguish_tier(0.05, 5), 7);
        assert_eq!(distinguish_tier(0.0, 0), 9);
        assert_eq!(distinguish_tier(0.049, 4), 9);
    }

    #[test]
    fn test_band_edges_fall_through_to_score() {
        // ratio exactly 0.6 misses the first band; score 6.0 + 3.0
        assert_eq!(distinguish_tier(0.6, 60), 1);
        // ratio 0.55 sits between bands 3 and 1; score 5.5 + 2.0
        assert_eq!(distinguish_tier(0.55, 40), 1);
        // few lesions but large ratio; score 3.0 + 0.1
        assert_eq!(distinguish_tier(0.3, 2), 5);
        // many lesions, tiny ratio; score 0.1 + 2.5
        assert_eq!(distinguish_tier(0.01, 50), 5);
        // score 0.1 + 4.0
        assert_eq!(distinguish_tier(0.01, 80), 3);
        // score 1.0 + 0.2
        assert_eq!(distinguish_tier(0.1, 4), 9);
        // score 1.5 + 0.2
        assert_eq!(distinguish_tier(0.15, 4), 7);
    }

    #[test]
    fn test_always_odd_grade() {
        for count in [0, 3, 5, 19, 20, 39, 40, 59, 60, 200] {
            for step in 0..=20 {
                let tier = distinguish_tier(step as f64 / 20.0, count);
                assert!([1, 3, 5, 7, 9].contains(&tier));
            }
        }
    }
}
