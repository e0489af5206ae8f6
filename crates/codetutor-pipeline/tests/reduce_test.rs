use codetutor_pipeline::stages::merge_batches;
use codetutor_pipeline::{BatchAbstraction, BatchResult, BatchSpan};
use std::collections::{BTreeMap, BTreeSet};

fn item(name: &str, local_files: &[usize]) -> BatchAbstraction {
    BatchAbstraction {
        name: name.to_string(),
        description: format!("About {}", name),
        local_files: local_files.to_vec(),
    }
}

fn batches() -> Vec<BatchResult> {
    vec![
        BatchResult {
            batch: 0,
            span: BatchSpan { start: 0, end: 3 },
            items: vec![item("Parser", &[0, 2]), item("Config", &[1])],
        },
        BatchResult {
            batch: 1,
            span: BatchSpan { start: 3, end: 5 },
            items: vec![item("parser", &[1]), item("Cache", &[0])],
        },
        BatchResult {
            batch: 2,
            span: BatchSpan { start: 5, end: 8 },
            items: vec![item("CACHE", &[2]), item("Server", &[0, 1])],
        },
    ]
}

/// Lowercased name to file set; index values are allowed to differ.
fn shape(batches: &[BatchResult]) -> BTreeMap<String, BTreeSet<usize>> {
    merge_batches(batches)
        .into_iter()
        .map(|a| (a.name.to_lowercase(), a.files))
        .collect()
}

#[test]
fn test_merge_is_independent_of_batch_completion_order() {
    let forward = batches();
    let expected = shape(&forward);
    assert_eq!(expected.len(), 4);
    assert_eq!(expected["parser"], BTreeSet::from([0, 2, 4]));
    assert_eq!(expected["cache"], BTreeSet::from([3, 7]));
    assert_eq!(expected["server"], BTreeSet::from([5, 6]));

    let orders: [[usize; 3]; 5] = [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    for order in orders {
        let permuted: Vec<BatchResult> = order.iter().map(|&i| forward[i].clone()).collect();
        assert_eq!(shape(&permuted), expected, "order {:?}", order);
    }
}

#[test]
fn test_first_seen_spelling_is_canonical() {
    let merged = merge_batches(&batches());
    let names: Vec<_> = merged.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Parser", "Config", "Cache", "Server"]);
    assert_eq!(merged[0].description, "About Parser");
}

#[test]
fn test_out_of_span_indices_are_dropped() {
    let merged = merge_batches(&[BatchResult {
        batch: 0,
        span: BatchSpan { start: 4, end: 6 },
        items: vec![item("Edge", &[1, 2, 9])],
    }]);
    assert_eq!(merged[0].files, BTreeSet::from([5]));
}
