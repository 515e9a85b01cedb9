use spindle::pipeline::{Traversal, source};
use std::ops::ControlFlow;

#[test]
fn test_odd_elements_are_doubled_and_even_ones_dropped() {
    let out: Vec<i32> = source(vec![1, 2, 3, 4, 5, 6])
        .expand(|x| if x % 2 == 1 { vec![x, x] } else { Vec::new() })
        .collect();

    assert_eq!(out, vec![1, 1, 3, 3, 5, 5]);
}

#[test]
fn test_stages_compose_in_order() {
    let out = source(1..=5)
        .map(|x| x * 10)
        .filter(|x| *x != 30)
        .expand(|x| [x, x + 1])
        .map(|x| x.to_string())
        .joining(",");

    assert_eq!(out, "10,11,20,21,40,41,50,51");
}

#[test]
fn test_words_per_line_via_map_multi() {
    let lines = ["the quick", "", "brown fox jumps"];

    let stats = source(lines)
        .map_multi(|line, down| down.extend(line.split_whitespace()))
        .map(|word| word.len() as i64)
        .summary_statistics();

    assert_eq!(stats.count(), 5);
    assert_eq!(stats.sum(), 21);
    assert_eq!(stats.min(), Some(3));
    assert_eq!(stats.max(), Some(5));
}

#[test]
fn test_a_consumed_pipeline_is_rebuilt_from_the_source() {
    let make = || source(0..).filter(|x| x % 5 == 0);

    let mut first = Vec::new();
    let traversal = make().for_each(|x| {
        first.push(x);
        if first.len() == 3 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    assert_eq!(traversal, Traversal { delivered: 3, exhausted: false });
    assert_eq!(first, vec![0, 5, 10]);

    let again: Vec<_> = make().into_iter().take(3).collect();
    assert_eq!(again, first);
}
