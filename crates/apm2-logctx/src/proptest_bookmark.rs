//! Property tests for bookmark restoration.

use proptest::prelude::*;
use tracing::Level;

use crate::context::{Bookmark, SharedContext};
use crate::enricher::property;
use crate::record::LogRecord;
use crate::slot::SharedSlot;
use crate::stack::EnricherStack;
use crate::value::{DefaultPropertyFactory, PropertyValue};

#[derive(Debug, Clone)]
enum Op {
    Push(i64),
    PushMany(usize),
    Suspend,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i64>().prop_map(Op::Push),
        (0_usize..4).prop_map(Op::PushMany),
        Just(Op::Suspend),
    ]
}

fn arb_ops(max_count: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(arb_op(), 1..=max_count)
}

fn apply<'a>(stack: &'a SharedContext, op: &Op) -> Bookmark<'a, SharedSlot> {
    match op {
        Op::Push(value) => stack.push_property("K", value, false).unwrap(),
        Op::PushMany(count) => {
            stack.push_many((0..*count).map(|i| property(format!("M{i}"), i).unwrap()))
        },
        Op::Suspend => stack.suspend(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Releasing in LIFO order walks back through every intermediate stack.
    #[test]
    fn prop_lifo_release_restores_each_level(ops in arb_ops(24)) {
        let stack = SharedContext::shared();
        let _base = stack.push_property("Base", 0, false).unwrap();
        let initial = stack.snapshot();

        let mut history: Vec<EnricherStack> = Vec::new();
        let mut bookmarks = Vec::new();
        for op in &ops {
            history.push(stack.snapshot());
            bookmarks.push(apply(&stack, op));
        }

        while let Some(mut bookmark) = bookmarks.pop() {
            bookmark.release();
            let expected = history.pop().unwrap();
            prop_assert!(stack.snapshot().ptr_eq(&expected));
        }
        prop_assert!(stack.snapshot().ptr_eq(&initial));
    }

    /// In any release order, each release installs the snapshot its bookmark
    /// captured.
    #[test]
    fn prop_any_release_order_restores_captured_snapshot(
        (ops, order) in arb_ops(16).prop_flat_map(|ops| {
            let indices: Vec<usize> = (0..ops.len()).collect();
            (Just(ops), Just(indices).prop_shuffle())
        })
    ) {
        let stack = SharedContext::shared();

        let mut bookmarks: Vec<Option<Bookmark<'_, SharedSlot>>> = Vec::new();
        for op in &ops {
            bookmarks.push(Some(apply(&stack, op)));
        }

        for index in order {
            let mut bookmark = bookmarks[index].take().unwrap();
            let captured = bookmark.saved().cloned().unwrap();
            bookmark.release();
            prop_assert!(stack.snapshot().ptr_eq(&captured));
        }
    }

    /// The most recently pushed value for a name is the one a record sees.
    #[test]
    fn prop_top_of_stack_wins(values in prop::collection::vec(any::<i64>(), 1..32)) {
        let stack = SharedContext::shared();
        let bookmarks: Vec<_> = values
            .iter()
            .map(|value| stack.push_property("K", value, false).unwrap())
            .collect();

        let mut record = LogRecord::new(Level::INFO, "prop", "");
        stack.enrich(&mut record, &DefaultPropertyFactory::new());

        prop_assert_eq!(record.property("K"), Some(&PropertyValue::Int(*values.last().unwrap())));
        prop_assert_eq!(bookmarks.len(), stack.depth());
    }
}
