//! Sequential counterparts of `par_map` and enum-table lookups.

use super::errors::LookupError;
use std::{collections::HashMap, fmt::Debug, hash::Hash};

/// Applies `mapper` to every input in order, stopping at the first error.
pub fn map_to_vec<I, O, E, F>(mapper: F, inputs: impl IntoIterator<Item = I>) -> Result<Vec<O>, E>
where
    F: FnMut(I) -> Result<O, E>,
{
    inputs.into_iter().map(mapper).collect()
}

/// Like [`map_to_vec`], passing the same `options` to every call.
pub fn map_to_vec_with<I, O, P, E, F>(
    mut mapper: F,
    inputs: impl IntoIterator<Item = I>,
    options: &[P],
) -> Result<Vec<O>, E>
where
    F: FnMut(I, &[P]) -> Result<O, E>,
{
    inputs.into_iter().map(|i| mapper(i, options)).collect()
}

/// Looks up the value stored for `key`.
pub fn enum_to_value<K, V>(table: &HashMap<K, V>, key: &K) -> Result<V, LookupError>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    table
        .get(key)
        .cloned()
        .ok_or_else(|| LookupError::invalid_enum(format!("invalid value {key:?}")))
}

/// Reverse lookup: the key whose value equals `value`.
///
/// If several keys share the value, which one is returned is unspecified.
pub fn value_to_enum<K, V>(table: &HashMap<K, V>, value: &V) -> Result<K, LookupError>
where
    K: Clone,
    V: PartialEq + Debug,
{
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(k, _)| k.clone())
        .ok_or_else(|| LookupError::invalid_enum(format!("invalid enum value {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CODE_INVALID_ENUM;

    fn numbers() -> HashMap<&'static str, i32> {
        HashMap::from([("one", 1), ("two", 2), ("three", 3)])
    }

    #[test]
    fn enum_to_value_finds_key() {
        let table = numbers();
        assert_eq!(enum_to_value(&table, &"one"), Ok(1));
        assert_eq!(enum_to_value(&table, &"three"), Ok(3));
    }

    #[test]
    fn enum_to_value_rejects_unknown_key() {
        let table = numbers();
        for key in ["four", ""] {
            let err = enum_to_value(&table, &key).unwrap_err();
            assert_eq!(err.code, CODE_INVALID_ENUM);
            assert_eq!(err.message, format!("invalid value {key:?}"));
        }
    }

    #[test]
    fn value_to_enum_reverses_lookup() {
        let table = numbers();
        assert_eq!(value_to_enum(&table, &1), Ok("one"));
        assert_eq!(value_to_enum(&table, &3), Ok("three"));

        let err = value_to_enum(&table, &4).unwrap_err();
        assert_eq!(err.code, CODE_INVALID_ENUM);
    }

    #[test]
    fn map_to_vec_fails_fast() {
        let double = |i: i32| Ok::<_, String>(i * 2);
        assert_eq!(map_to_vec(double, vec![1, 2, 3, 4, 5]), Ok(vec![2, 4, 6, 8, 10]));
        assert_eq!(map_to_vec(double, Vec::<i32>::new()), Ok(vec![]));

        let mut calls = 0;
        let fail_on_3 = |i: i32| {
            calls += 1;
            if i == 3 {
                Err(format!("bad {i}"))
            } else {
                Ok(i * 2)
            }
        };
        assert_eq!(map_to_vec(fail_on_3, 1..=5), Err("bad 3".to_string()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn map_to_vec_with_passes_options() {
        let multiply =
            |i: i32, factors: &[i32]| Ok::<_, String>(factors.iter().fold(i, |acc, f| acc * f));

        assert_eq!(map_to_vec_with(multiply, 1..=5, &[2]), Ok(vec![2, 4, 6, 8, 10]));
        assert_eq!(map_to_vec_with(multiply, 1..=5, &[2, 3]), Ok(vec![6, 12, 18, 24, 30]));
        assert_eq!(map_to_vec_with(multiply, 1..=5, &[]), Ok(vec![1, 2, 3, 4, 5]));
        assert_eq!(map_to_vec_with(multiply, Vec::new(), &[2]), Ok(vec![]));

        let fail_on_3 = |i: i32, _: &[i32]| if i == 3 { Err("bad") } else { Ok(i) };
        assert_eq!(map_to_vec_with(fail_on_3, 1..=5, &[2]), Err("bad"));
    }
}
