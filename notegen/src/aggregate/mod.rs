//! Fan-in aggregation of extraction results.

use crate::errors::AbortReason;
use crate::pool::TaskResult;

/// Separator placed between contributions in the aggregate document.
pub const SEPARATOR: &str = "\n\n---\n\n";

/// The combined document produced from all successful extractions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDocument {
    /// Concatenated extraction texts.
    pub text: String,
    /// How many task results contributed.
    pub contributing: usize,
}

/// Joins successful, non-empty task results into one document.
///
/// Results are ordered by the original input index before joining, so the
/// output is invariant under permutation of completion order. An empty
/// filtered set is the one condition that halts the pipeline before the
/// refinement chain.
///
/// # Errors
///
/// Returns [`AbortReason::NoValidExtractions`] when no result qualifies.
pub fn aggregate(results: &[TaskResult]) -> Result<AggregateDocument, AbortReason> {
    let mut contributions: Vec<&TaskResult> = results
        .iter()
        .filter(|r| r.is_success() && !r.text.trim().is_empty())
        .collect();

    if contributions.is_empty() {
        return Err(AbortReason::NoValidExtractions);
    }

    contributions.sort_by_key(|r| r.item.index);

    let text = contributions
        .iter()
        .map(|r| r.text.trim())
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    Ok(AggregateDocument {
        text,
        contributing: contributions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::InputItem;
    use pretty_assertions::assert_eq;

    fn success(index: usize, text: &str) -> TaskResult {
        TaskResult::success(InputItem::new(index, format!("img{index}.jpg")), text)
    }

    fn failed(index: usize) -> TaskResult {
        TaskResult::failed(InputItem::new(index, format!("img{index}.jpg")), "boom")
    }

    #[test]
    fn test_joins_in_input_order() {
        let results = vec![success(2, "third"), success(0, "first"), success(1, "second")];
        let doc = aggregate(&results).expect("aggregate");

        assert_eq!(doc.text, format!("first{SEPARATOR}second{SEPARATOR}third"));
        assert_eq!(doc.contributing, 3);
    }

    #[test]
    fn test_invariant_under_completion_order_permutation() {
        let a = vec![success(0, "a"), success(1, "b"), success(2, "c")];
        let b = vec![success(2, "c"), success(0, "a"), success(1, "b")];
        let c = vec![success(1, "b"), success(2, "c"), success(0, "a")];

        let doc_a = aggregate(&a).expect("a");
        let doc_b = aggregate(&b).expect("b");
        let doc_c = aggregate(&c).expect("c");

        assert_eq!(doc_a, doc_b);
        assert_eq!(doc_b, doc_c);
    }

    #[test]
    fn test_failures_and_blank_text_are_filtered() {
        let mut blank = success(1, "   ");
        blank.text = "   ".to_string();
        let results = vec![success(0, "kept"), failed(2), blank];

        let doc = aggregate(&results).expect("aggregate");
        assert_eq!(doc.text, "kept");
        assert_eq!(doc.contributing, 1);
    }

    #[test]
    fn test_empty_filtered_set_aborts() {
        let results = vec![failed(0), failed(1)];
        assert_eq!(
            aggregate(&results).expect_err("must abort"),
            AbortReason::NoValidExtractions
        );
    }

    #[test]
    fn test_no_results_aborts() {
        assert!(aggregate(&[]).is_err());
    }
}
