// this_file: crates/oshape-unicode/src/proptests.rs

use super::*;
use proptest::prelude::*;

proptest! {
    // Property: repeated single steps reach the full canonical decomposition
    #[test]
    fn prop_decompose_steps_reach_full_decomposition(c in any::<char>()) {
        let ucd = IcuUnicode::shared();
        if ucd.decompose(c as u32).is_none() {
            return Ok(());
        }
        let mut expected = Vec::new();
        unicode_normalization::char::decompose_canonical(c, |d| expected.push(d as u32));

        let mut pending = vec![c as u32];
        let mut actual = Vec::new();
        while let Some(cp) = pending.pop() {
            match ucd.decompose(cp) {
                Some((a, Some(b))) => {
                    pending.push(b);
                    pending.push(a);
                },
                Some((a, None)) => pending.push(a),
                None => actual.push(cp),
            }
        }
        prop_assert_eq!(actual, expected);
    }

    // Property: marks are never letters
    #[test]
    fn prop_categories_are_exclusive(c in any::<char>()) {
        let gc = IcuUnicode::shared().general_category(c as u32);
        prop_assert!(!(gc.is_mark() && gc.is_letter()));
    }
}
