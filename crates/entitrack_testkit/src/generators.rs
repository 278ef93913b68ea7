//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random field values and scripted
//! graph mutations that exercise the fixup engine from every direction.

use proptest::prelude::*;

use entitrack_metadata::{Value, ValueKind};

/// Strategy for generating non-null values of a kind.
pub fn value_strategy(kind: ValueKind) -> BoxedStrategy<Value> {
    match kind {
        ValueKind::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ValueKind::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        ValueKind::Text => prop::string::string_regex("[a-z]{0,12}")
            .expect("valid regex")
            .prop_map(Value::Text)
            .boxed(),
        ValueKind::Bytes => prop::collection::vec(any::<u8>(), 0..16)
            .prop_map(Value::Bytes)
            .boxed(),
    }
}

/// Strategy for generating values of a kind, including null.
pub fn nullable_value_strategy(kind: ValueKind) -> BoxedStrategy<Value> {
    prop_oneof![
        1 => Just(Value::Null),
        4 => value_strategy(kind),
    ]
    .boxed()
}

/// One scripted mutation against a category/product graph.
///
/// Entries are addressed by index into the fixture's category and product
/// lists so that generated scripts stay valid for any graph of the agreed
/// size.
#[derive(Debug, Clone)]
pub enum GraphOp {
    /// Point a product's reference navigation at a category (or clear it).
    SetCategoryReference {
        /// Index of the product.
        product: usize,
        /// Index of the target category; `None` clears the reference.
        category: Option<usize>,
    },
    /// Write a product's foreign key field directly.
    SetCategoryForeignKey {
        /// Index of the product.
        product: usize,
        /// Index of the target category; `None` writes null.
        category: Option<usize>,
    },
    /// Add a product to a category's collection navigation.
    AddToProducts {
        /// Index of the category.
        category: usize,
        /// Index of the product.
        product: usize,
    },
    /// Remove a product from a category's collection navigation.
    RemoveFromProducts {
        /// Index of the category.
        category: usize,
        /// Index of the product.
        product: usize,
    },
}

/// Strategy for one graph mutation over the given population sizes.
pub fn graph_op_strategy(products: usize, categories: usize) -> BoxedStrategy<GraphOp> {
    let product = 0..products;
    let category = 0..categories;
    let optional_category = prop::option::of(0..categories);
    prop_oneof![
        (product.clone(), optional_category.clone()).prop_map(|(product, category)| {
            GraphOp::SetCategoryReference { product, category }
        }),
        (product.clone(), optional_category).prop_map(|(product, category)| {
            GraphOp::SetCategoryForeignKey { product, category }
        }),
        (category.clone(), product.clone())
            .prop_map(|(category, product)| GraphOp::AddToProducts { category, product }),
        (category, product)
            .prop_map(|(category, product)| GraphOp::RemoveFromProducts { category, product }),
    ]
    .boxed()
}

/// Strategy for a mutation script of up to `max_len` operations.
pub fn graph_ops_strategy(
    products: usize,
    categories: usize,
    max_len: usize,
) -> BoxedStrategy<Vec<GraphOp>> {
    prop::collection::vec(graph_op_strategy(products, categories), 0..max_len).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn value_strategy_matches_kind(value in value_strategy(ValueKind::Integer)) {
            prop_assert_eq!(value.kind(), Some(ValueKind::Integer));
        }

        #[test]
        fn nullable_strategy_conforms(value in nullable_value_strategy(ValueKind::Text)) {
            prop_assert!(value.conforms_to(ValueKind::Text));
        }

        #[test]
        fn ops_stay_in_range(ops in graph_ops_strategy(3, 2, 16)) {
            for op in ops {
                match op {
                    GraphOp::SetCategoryReference { product, category }
                    | GraphOp::SetCategoryForeignKey { product, category } => {
                        prop_assert!(product < 3);
                        if let Some(category) = category {
                            prop_assert!(category < 2);
                        }
                    }
                    GraphOp::AddToProducts { category, product }
                    | GraphOp::RemoveFromProducts { category, product } => {
                        prop_assert!(category < 2);
                        prop_assert!(product < 3);
                    }
                }
            }
        }
    }
}
