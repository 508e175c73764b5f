mod common;

use common::strategies::*;
use proptest::prelude::*;
use sparkify_etl::quality::Comparator;
use sparkify_etl::{EtlError, ScalarValue};

fn native(comparator: Comparator, observed: i64, expected: i64) -> bool {
    match comparator {
        Comparator::Eq => observed == expected,
        Comparator::Ne => observed != expected,
        Comparator::Lt => observed < expected,
        Comparator::Le => observed <= expected,
        Comparator::Gt => observed > expected,
        Comparator::Ge => observed >= expected,
    }
}

proptest! {
    /// Property: every comparator agrees with the native integer operator
    #[test]
    fn comparator_matches_native_operator(
        comparator in comparator_strategy(),
        observed in any::<i64>(),
        expected in any::<i64>(),
    ) {
        prop_assert_eq!(comparator.apply(&observed, &expected), native(comparator, observed, expected));
    }

    /// Property: integer scalars from the warehouse compare like native integers
    #[test]
    fn scalar_evaluation_matches_native_operator(
        comparator in comparator_strategy(),
        observed in -1_000_000i64..1_000_000,
        expected in -1_000_000i64..1_000_000,
    ) {
        let result = comparator.evaluate(
            &ScalarValue::Integer(observed),
            &ScalarValue::Integer(expected),
        );
        prop_assert_eq!(result, Some(native(comparator, observed, expected)));
    }

    /// Property: a parsed code always yields the comparator it names
    #[test]
    fn codes_parse_back(comparator in comparator_strategy()) {
        prop_assert_eq!(comparator.code().parse::<Comparator>().unwrap(), comparator);
    }

    /// Property: anything else is a configuration error, never a comparator
    #[test]
    fn unknown_symbols_are_config_errors(symbol in unknown_symbol_strategy()) {
        let parsed = symbol.parse::<Comparator>();
        prop_assert!(matches!(parsed, Err(EtlError::Config(_))), "{:?} parsed as {:?}", symbol, parsed);
    }
}

#[test]
fn test_equal_values_satisfy_only_inclusive_comparators() {
    let passing: Vec<Comparator> = Comparator::ALL
        .into_iter()
        .filter(|comparator| comparator.apply(&7, &7))
        .collect();
    assert_eq!(passing, vec![Comparator::Eq, Comparator::Le, Comparator::Ge]);
}
