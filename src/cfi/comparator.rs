//! CFI Comparison and Ordering
//!
//! Orders CFIs by reading position so annotations and reading progress can
//! be sorted without resolving them. [`compare_reading_order`] looks at
//! positions only. The `Ord` impls agree with `Eq`: CFIs at the same
//! position are further ordered by their assertions and range split.

use std::cmp::Ordering;

use super::types::*;

/// Compare two CFIs by the position they address. Assertions are ignored
/// and a range compares by its start, then its end.
pub fn compare_reading_order(a: &Cfi, b: &Cfi) -> Ordering {
    path_reading_order(&a.range_start(), &b.range_start())
        .then_with(|| path_reading_order(&a.range_end(), &b.range_end()))
        .then_with(|| a.is_range().cmp(&b.is_range()))
}

fn path_reading_order(a: &CfiPath, b: &CfiPath) -> Ordering {
    for (step_a, step_b) in a.steps.iter().zip(b.steps.iter()) {
        let cmp = step_reading_order(step_a, step_b);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    // Deeper paths come after their ancestors
    a.steps.len().cmp(&b.steps.len()).then_with(|| {
        match (&a.character_offset, &b.character_offset) {
            (Some(a), Some(b)) => a.offset.cmp(&b.offset),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    })
}

fn step_reading_order(a: &CfiStep, b: &CfiStep) -> Ordering {
    match (&a.step_type, &b.step_type) {
        (StepType::Indirection, StepType::Indirection) => Ordering::Equal,
        (StepType::Index(a), StepType::Index(b)) => a.cmp(b),
        (StepType::Indirection, StepType::Index(_)) => Ordering::Less,
        (StepType::Index(_), StepType::Indirection) => Ordering::Greater,
    }
}

impl Ord for Cfi {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_reading_order(self, other)
            .then_with(|| self.path.cmp(&other.path))
            .then_with(|| match (&self.range, &other.range) {
                (Some(a), Some(b)) => a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)),
                (a, b) => a.is_some().cmp(&b.is_some()),
            })
    }
}

impl PartialOrd for Cfi {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiPath {
    fn cmp(&self, other: &Self) -> Ordering {
        path_reading_order(self, other)
            .then_with(|| self.steps.cmp(&other.steps))
            .then_with(|| self.character_offset.cmp(&other.character_offset))
    }
}

impl PartialOrd for CfiPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiStep {
    fn cmp(&self, other: &Self) -> Ordering {
        step_reading_order(self, other)
            .then_with(|| self.id_assertion.cmp(&other.id_assertion))
            .then_with(|| self.text_assertion.cmp(&other.text_assertion))
            .then_with(|| self.parameters.cmp(&other.parameters))
    }
}

impl PartialOrd for CfiStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Determine if CFI `a` comes before CFI `b` in reading order
pub fn is_before(a: &Cfi, b: &Cfi) -> bool {
    compare_reading_order(a, b) == Ordering::Less
}

/// Determine if CFI `a` comes after CFI `b` in reading order
pub fn is_after(a: &Cfi, b: &Cfi) -> bool {
    compare_reading_order(a, b) == Ordering::Greater
}

/// Check if a CFI falls within `start..=end`
pub fn is_in_range(cfi: &Cfi, start: &Cfi, end: &Cfi) -> bool {
    compare_reading_order(cfi, start) != Ordering::Less
        && compare_reading_order(cfi, end) != Ordering::Greater
}

/// Compare two CFI strings in reading order. Returns None if either CFI is
/// invalid.
pub fn compare_cfi_strings(a: &str, b: &str) -> Option<Ordering> {
    let cfi_a = super::parser::parse(a).ok()?;
    let cfi_b = super::parser::parse(b).ok()?;
    Some(compare_reading_order(&cfi_a, &cfi_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parser::parse;
    use std::collections::BTreeSet;

    #[test]
    fn test_ordering_within_chapter() {
        let a = parse("epubcfi(/6/4!/4/2/1:10)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1:20)").unwrap();

        assert!(a < b);
        assert!(is_before(&a, &b));
        assert!(is_after(&b, &a));
    }

    #[test]
    fn test_ordering_across_chapters_and_depth() {
        let a = parse("epubcfi(/6/4!/4/2)").unwrap();
        let b = parse("epubcfi(/6/6!/4/2)").unwrap();
        assert!(a < b);

        let shallow = parse("epubcfi(/6/4!/4/2)").unwrap();
        let deep = parse("epubcfi(/6/4!/4/2/1)").unwrap();
        assert!(shallow < deep);

        // A text run before an element sibling sorts first
        let text = parse("epubcfi(/6/4!/4/1:3)").unwrap();
        let element = parse("epubcfi(/6/4!/4/2)").unwrap();
        assert!(text < element);
    }

    #[test]
    fn test_assertions_break_ties_only() {
        let a = parse("epubcfi(/6/4[c1]!/4/2/1:42)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1:42)").unwrap();
        assert_eq!(compare_reading_order(&a, &b), Ordering::Equal);
        assert!(!is_before(&a, &b) && !is_after(&a, &b));
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());

        let set: BTreeSet<Cfi> = [a.clone(), b.clone(), a.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);

        // Assertions never outrank position
        let later = parse("epubcfi(/6/4!/4/2/1:43)").unwrap();
        assert!(a < later && b < later);
    }

    #[test]
    fn test_range_split_is_ordered_consistently() {
        let shallow = parse("epubcfi(/6/4!/4,/2/1:0,/2/1:5)").unwrap();
        let deep = parse("epubcfi(/6/4!/4/2,/1:0,/1:5)").unwrap();
        assert_eq!(compare_reading_order(&shallow, &deep), Ordering::Equal);
        assert_ne!(shallow, deep);
        assert_ne!(shallow.cmp(&deep), Ordering::Equal);

        let same = parse("epubcfi(/6/4!/4/2,/1:0,/1:5)").unwrap();
        assert_eq!(deep.cmp(&same), Ordering::Equal);
    }

    #[test]
    fn test_ranges_sort_by_start() {
        let range = parse("epubcfi(/6/4!/4/2,/1:5,/3:1)").unwrap();
        let before = parse("epubcfi(/6/4!/4/2/1:4)").unwrap();
        let after = parse("epubcfi(/6/4!/4/2/1:6)").unwrap();

        assert!(before < range);
        assert!(range < after);
    }

    #[test]
    fn test_in_range() {
        let start = parse("epubcfi(/6/4!/4/2/1:0)").unwrap();
        let end = parse("epubcfi(/6/4!/4/2/1:100)").unwrap();
        let middle = parse("epubcfi(/6/4!/4/2/1:50)").unwrap();
        let outside = parse("epubcfi(/6/4!/4/2/1:150)").unwrap();

        assert!(is_in_range(&middle, &start, &end));
        assert!(is_in_range(&start, &start, &end));
        assert!(!is_in_range(&outside, &start, &end));
    }

    #[test]
    fn test_sort() {
        let mut cfis = vec![
            parse("epubcfi(/6/8!/4/2/1:50)").unwrap(),
            parse("epubcfi(/6/4!/4/2/1:10)").unwrap(),
            parse("epubcfi(/6/6!/4/2/1:30)").unwrap(),
            parse("epubcfi(/6/4!/4/2/1:5)").unwrap(),
        ];

        cfis.sort();

        let sorted: Vec<String> = cfis.iter().map(ToString::to_string).collect();
        assert_eq!(
            sorted,
            vec![
                "epubcfi(/6/4!/4/2/1:5)",
                "epubcfi(/6/4!/4/2/1:10)",
                "epubcfi(/6/6!/4/2/1:30)",
                "epubcfi(/6/8!/4/2/1:50)",
            ]
        );
    }

    #[test]
    fn test_compare_cfi_strings() {
        assert_eq!(
            compare_cfi_strings("epubcfi(/6/4!/4/2/1:10)", "epubcfi(/6/4!/4/2/1:20)"),
            Some(Ordering::Less)
        );
        assert_eq!(compare_cfi_strings("invalid", "epubcfi(/6/4!/4/2)"), None);
    }
}
