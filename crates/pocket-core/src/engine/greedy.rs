use pocket_abi::Token;

/// Greedy pick over one logits row.
///
/// Strict greater-than scan from negative infinity: the lowest id wins ties,
/// and NaN never wins. `None` only for an empty row.
pub fn argmax(logits: &[f32]) -> Option<Token> {
    if logits.is_empty() {
        return None;
    }
    let mut best = 0usize;
    let mut max = f32::NEG_INFINITY;
    for (id, &logit) in logits.iter().enumerate() {
        if logit > max {
            max = logit;
            best = id;
        }
    }
    Some(Token(best as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_maximum() {
        assert_eq!(argmax(&[0.1, 2.5, -1.0, 2.4]), Some(Token(1)));
    }

    #[test]
    fn lowest_id_wins_ties() {
        assert_eq!(argmax(&[0.0, 3.0, 1.0, 3.0, 3.0]), Some(Token(1)));
    }

    #[test]
    fn nan_is_skipped() {
        assert_eq!(argmax(&[f32::NAN, -5.0, f32::NAN]), Some(Token(1)));
    }

    #[test]
    fn all_negative_infinity_falls_back_to_zero() {
        assert_eq!(argmax(&[f32::NEG_INFINITY; 4]), Some(Token(0)));
    }

    #[test]
    fn empty_row_has_no_pick() {
        assert_eq!(argmax(&[]), None);
    }
}
