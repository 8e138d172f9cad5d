//! Functions that take or return maps. Arguments arrive as [`BoxedXvalue`]s:
//! ephemeral ones are moved from, aliased ones are only read or copied.

use crate::internal_error;
use crate::runtime::{
    error::RuntimeResult,
    format::NumberFormat,
    json,
    value::Mlrval,
    xvalue::{BoxedXvalue, Level, MapKey, Xvalue},
};
use std::collections::HashSet;

fn terminal(value: Mlrval) -> Xvalue {
    Xvalue::Terminal(value)
}

pub fn haskey(map: BoxedXvalue<'_>, key: BoxedXvalue<'_>) -> Xvalue {
    let found = match (map.as_map(), key.as_terminal()) {
        (Some(level), Some(key)) => match MapKey::from_mlrval(key) {
            Ok(Some(key)) => level.contains_key(&key),
            _ => false,
        },
        _ => false,
    };
    terminal(Mlrval::Boolean(found))
}

pub fn length(value: BoxedXvalue<'_>) -> Xvalue {
    let count = if value.is_absent() { 0 } else { value.length() };
    terminal(Mlrval::Int(count as i64))
}

pub fn depth(value: BoxedXvalue<'_>) -> Xvalue {
    if value.is_absent() {
        return terminal(Mlrval::Absent);
    }
    terminal(Mlrval::Int(value.depth() as i64))
}

pub fn leafcount(value: BoxedXvalue<'_>) -> Xvalue {
    if value.is_absent() {
        return terminal(Mlrval::Absent);
    }
    terminal(Mlrval::Int(value.leaf_count() as i64))
}

/// Union of all map arguments; later arguments win. Non-maps are skipped.
pub fn mapsum(args: Vec<BoxedXvalue<'_>>) -> RuntimeResult<Xvalue> {
    let mut sum: Option<Level> = None;
    for arg in args {
        let Some(level) = arg.into_level() else {
            continue;
        };
        match sum.as_mut() {
            None => sum = Some(level),
            Some(sum) => {
                for (key, value) in level {
                    sum.insert(key, value);
                }
            }
        }
    }
    Ok(Xvalue::Map(sum.unwrap_or_default()))
}

/// The first argument with every key of the remaining map arguments
/// removed.
pub fn mapdiff(args: Vec<BoxedXvalue<'_>>) -> RuntimeResult<Xvalue> {
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Xvalue::empty_map());
    };
    let Some(mut diff) = first.into_level() else {
        return Ok(terminal(Mlrval::Error));
    };
    for arg in args {
        if let Some(level) = arg.as_map() {
            for key in level.keys() {
                diff.remove(key);
            }
        }
    }
    Ok(Xvalue::Map(diff))
}

/// Keys named by the trailing arguments of `mapexcept`/`maponly`: scalars
/// name one key, maps name their values.
fn named_keys(args: &[BoxedXvalue<'_>]) -> HashSet<MapKey> {
    let mut keys = HashSet::new();
    for arg in args {
        match &**arg {
            Xvalue::Terminal(value) => {
                if let Ok(Some(key)) = MapKey::from_mlrval(value) {
                    keys.insert(key);
                }
            }
            Xvalue::Map(level) => {
                for (_, value) in level {
                    if let Some(Ok(Some(key))) = value.as_terminal().map(MapKey::from_mlrval) {
                        keys.insert(key);
                    }
                }
            }
        }
    }
    keys
}

pub fn mapexcept(mut args: Vec<BoxedXvalue<'_>>) -> RuntimeResult<Xvalue> {
    if args.is_empty() {
        return Err(internal_error!("mapexcept called without arguments"));
    }
    let first = args.remove(0);
    let keys = named_keys(&args);
    let Some(mut level) = first.into_level() else {
        return Ok(terminal(Mlrval::Error));
    };
    for key in &keys {
        level.remove(key);
    }
    Ok(Xvalue::Map(level))
}

pub fn maponly(mut args: Vec<BoxedXvalue<'_>>) -> RuntimeResult<Xvalue> {
    if args.is_empty() {
        return Err(internal_error!("maponly called without arguments"));
    }
    let first = args.remove(0);
    let keys = named_keys(&args);
    let level: Level = match first {
        BoxedXvalue::Ephemeral(Xvalue::Map(level)) => level
            .into_iter()
            .filter(|(key, _)| keys.contains(key))
            .collect(),
        BoxedXvalue::Aliased(Xvalue::Map(level)) => level
            .iter()
            .filter(|(key, _)| keys.contains(*key))
            .map(|(key, value)| (key.clone(), value.copy()))
            .collect(),
        _ => return Ok(terminal(Mlrval::Error)),
    };
    Ok(Xvalue::Map(level))
}

/// Input text and separator for the split family: `Err` holds the finished
/// result for absent, error or map inputs.
fn split_operands(input: &Xvalue, separator: &Xvalue) -> Result<(String, String), Xvalue> {
    let (Some(input), Some(separator)) = (input.as_terminal(), separator.as_terminal()) else {
        return Err(terminal(Mlrval::Error));
    };
    match (input, separator) {
        (Mlrval::Absent, _) => Err(terminal(Mlrval::Absent)),
        (Mlrval::Error, _) | (_, Mlrval::Error | Mlrval::Absent) => Err(terminal(Mlrval::Error)),
        _ => Ok((input.to_string(), separator.to_string())),
    }
}

fn split_pieces<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if text.is_empty() {
        Vec::new()
    } else if separator.is_empty() {
        vec![text]
    } else {
        text.split(separator).collect()
    }
}

fn split_values(input: &Xvalue, separator: &Xvalue, infer: bool) -> Xvalue {
    let (text, separator) = match split_operands(input, separator) {
        Ok(operands) => operands,
        Err(done) => return done,
    };
    Xvalue::Map(
        split_pieces(&text, &separator)
            .into_iter()
            .zip(1..)
            .map(|(piece, index)| (MapKey::Int(index), terminal(Mlrval::from_data(piece, infer))))
            .collect(),
    )
}

/// `"a,b,c"` to `{1: "a", 2: "b", 3: "c"}` with type inference on the
/// pieces. Lossy: `joinv` of the result writes inferred numbers back in
/// canonical form.
pub fn splitnv(input: BoxedXvalue<'_>, separator: BoxedXvalue<'_>) -> Xvalue {
    split_values(&input, &separator, true)
}

pub fn splitnvx(input: BoxedXvalue<'_>, separator: BoxedXvalue<'_>) -> Xvalue {
    split_values(&input, &separator, false)
}

fn split_pairs(input: &Xvalue, pair_separator: &Xvalue, list_separator: &Xvalue, infer: bool) -> Xvalue {
    let (text, list_separator) = match split_operands(input, list_separator) {
        Ok(operands) => operands,
        Err(done) => return done,
    };
    let pair_separator = match pair_separator.as_terminal() {
        Some(Mlrval::Absent | Mlrval::Error) | None => return terminal(Mlrval::Error),
        Some(separator) => separator.to_string(),
    };
    let mut level = Level::new();
    for (piece, index) in split_pieces(&text, &list_separator).into_iter().zip(1i64..) {
        match piece.split_once(pair_separator.as_str()).filter(|_| !pair_separator.is_empty()) {
            Some((key, value)) => level.insert(
                MapKey::String(key.to_string()),
                terminal(Mlrval::from_data(value, infer)),
            ),
            None => level.insert(MapKey::Int(index), terminal(Mlrval::from_data(piece, infer))),
        }
    }
    Xvalue::Map(level)
}

/// `"a=1,b=2"` to `{"a": 1, "b": 2}`. Pieces lacking the pair separator are
/// keyed by position.
pub fn splitkv(input: BoxedXvalue<'_>, pair_separator: BoxedXvalue<'_>, list_separator: BoxedXvalue<'_>) -> Xvalue {
    split_pairs(&input, &pair_separator, &list_separator, true)
}

pub fn splitkvx(input: BoxedXvalue<'_>, pair_separator: BoxedXvalue<'_>, list_separator: BoxedXvalue<'_>) -> Xvalue {
    split_pairs(&input, &pair_separator, &list_separator, false)
}

/// Separator text for the join family, or `None` when it is not a scalar.
fn join_separator(separator: &Xvalue) -> Option<String> {
    match separator.as_terminal()? {
        Mlrval::Error => None,
        other => Some(other.to_string()),
    }
}

fn join(map: &Xvalue, separators: &[&Xvalue], piece: impl Fn(&MapKey, &Xvalue, &[String]) -> Option<String>) -> Xvalue {
    let Some(level) = map.as_map() else {
        return terminal(Mlrval::Absent);
    };
    let Some(separators) = separators
        .iter()
        .map(|separator| join_separator(separator))
        .collect::<Option<Vec<String>>>()
    else {
        return terminal(Mlrval::Error);
    };
    let list_separator = separators.last().cloned().unwrap_or_default();
    let pieces: Vec<String> = level
        .iter()
        .filter_map(|(key, value)| piece(key, value, &separators))
        .collect();
    terminal(Mlrval::from_string(pieces.join(&list_separator)))
}

pub fn joink(map: BoxedXvalue<'_>, separator: BoxedXvalue<'_>) -> Xvalue {
    join(&map, &[&*separator], |key, _, _| Some(key.to_string()))
}

/// Joins scalar values; nested maps are skipped.
pub fn joinv(map: BoxedXvalue<'_>, separator: BoxedXvalue<'_>) -> Xvalue {
    join(&map, &[&*separator], |_, value, _| {
        value.as_terminal().map(ToString::to_string)
    })
}

pub fn joinkv(map: BoxedXvalue<'_>, pair_separator: BoxedXvalue<'_>, list_separator: BoxedXvalue<'_>) -> Xvalue {
    join(&map, &[&*pair_separator, &*list_separator], |key, value, separators| {
        value
            .as_terminal()
            .map(|value| format!("{key}{}{value}", separators[0]))
    })
}

pub fn json_encode(value: BoxedXvalue<'_>) -> Xvalue {
    terminal(Mlrval::String(json::encode(&value, false, &NumberFormat::default())))
}

pub fn json_encode_multiline(value: BoxedXvalue<'_>, multiline: BoxedXvalue<'_>) -> Xvalue {
    let multiline = multiline
        .as_terminal()
        .and_then(Mlrval::as_boolean)
        .unwrap_or(false);
    terminal(Mlrval::String(json::encode(&value, multiline, &NumberFormat::default())))
}

pub fn json_decode(value: BoxedXvalue<'_>) -> Xvalue {
    match value.as_terminal() {
        Some(Mlrval::Absent) => terminal(Mlrval::Absent),
        Some(text @ (Mlrval::String(_) | Mlrval::Int(_) | Mlrval::Float(_) | Mlrval::Boolean(_))) => {
            json::decode(&text.to_string()).unwrap_or(terminal(Mlrval::Error))
        }
        _ => terminal(Mlrval::Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::xvalue::tests::{int, key, keys_of, map_of};

    fn s(text: &str) -> Xvalue {
        Xvalue::Terminal(Mlrval::from_string(text))
    }

    fn eph(value: Xvalue) -> BoxedXvalue<'static> {
        BoxedXvalue::Ephemeral(value)
    }

    fn ab() -> Xvalue {
        map_of(&[("a", int(1)), ("b", int(2))])
    }

    #[test]
    fn mapsum_later_arguments_win_and_inputs_survive() {
        let a = ab();
        let b = map_of(&[("b", int(3)), ("c", int(4))]);
        let sum = mapsum(vec![BoxedXvalue::Aliased(&a), BoxedXvalue::Aliased(&b)]).expect("sum");
        assert_eq!(sum, map_of(&[("a", int(1)), ("b", int(3)), ("c", int(4))]));
        assert_eq!(a, ab());
        assert_eq!(b, map_of(&[("b", int(3)), ("c", int(4))]));
    }

    #[test]
    fn mapsum_edge_cases() {
        assert_eq!(mapsum(vec![]).expect("sum"), Xvalue::empty_map());
        assert_eq!(mapsum(vec![eph(ab())]).expect("sum"), ab());
        assert_eq!(mapsum(vec![eph(int(7)), eph(ab())]).expect("sum"), ab());
    }

    #[test]
    fn mapdiff_removes_keys_of_later_maps() {
        let a = ab();
        let b = map_of(&[("b", int(3))]);
        let diff = mapdiff(vec![BoxedXvalue::Aliased(&a), BoxedXvalue::Aliased(&b)]).expect("diff");
        assert_eq!(diff, map_of(&[("a", int(1))]));
        assert_eq!(a, ab());
        assert_eq!(mapdiff(vec![]).expect("diff"), Xvalue::empty_map());
        assert_eq!(
            mapdiff(vec![eph(int(1)), eph(ab())]).expect("diff"),
            Xvalue::Terminal(Mlrval::Error)
        );
        assert_eq!(mapdiff(vec![eph(ab()), eph(int(1))]).expect("diff"), ab());
    }

    #[test]
    fn mapexcept_and_maponly_partition_the_keys() {
        let a = map_of(&[("a", int(1)), ("b", int(2)), ("c", int(3))]);
        let except = mapexcept(vec![BoxedXvalue::Aliased(&a), eph(s("b"))]).expect("except");
        let only = maponly(vec![BoxedXvalue::Aliased(&a), eph(s("b"))]).expect("only");
        assert_eq!(except, map_of(&[("a", int(1)), ("c", int(3))]));
        assert_eq!(only, map_of(&[("b", int(2))]));
        let mut union = keys_of(&except);
        union.extend(keys_of(&only));
        union.sort();
        assert_eq!(union, ["a", "b", "c"]);
        assert_eq!(a.length(), 3);
    }

    /// Every subset of a small key pool that mixes int and string spellings
    /// of the same text, so overlapping, disjoint and empty sets all occur.
    fn key_sets() -> Vec<Vec<MapKey>> {
        let pool = [MapKey::Int(1), key("1"), MapKey::Int(2), key("a"), key("b")];
        (0..1u32 << pool.len())
            .map(|mask| {
                pool.iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, k)| k.clone())
                    .collect()
            })
            .collect()
    }

    fn level_of(keys: &[MapKey], base: i64) -> Xvalue {
        Xvalue::Map(keys.iter().zip(base..).map(|(k, v)| (k.clone(), int(v))).collect())
    }

    fn entry<'v>(value: &'v Xvalue, k: &MapKey) -> Option<&'v Xvalue> {
        value.lookup(std::slice::from_ref(k))
    }

    #[test]
    fn map_algebra_laws_hold_over_generated_key_sets() {
        let sets = key_sets();
        for left_keys in &sets {
            for right_keys in &sets {
                let left = level_of(left_keys, 10);
                let right = level_of(right_keys, 100);
                let names: Xvalue = Xvalue::Map(
                    right_keys
                        .iter()
                        .zip(1..)
                        .map(|(k, i)| (MapKey::Int(i), Xvalue::Terminal(k.to_mlrval())))
                        .collect(),
                );
                let case = format!("left {left_keys:?} right {right_keys:?}");

                let sum = mapsum(vec![BoxedXvalue::Aliased(&left), BoxedXvalue::Aliased(&right)]).expect("sum");
                let union = left_keys.iter().chain(right_keys).collect::<HashSet<_>>();
                assert_eq!(sum.length(), union.len(), "mapsum size, {case}");
                for k in &union {
                    let expected = entry(&right, k).or_else(|| entry(&left, k));
                    assert_eq!(entry(&sum, k), expected, "mapsum {k:?}, {case}");
                }

                let diff = mapdiff(vec![BoxedXvalue::Aliased(&left), BoxedXvalue::Aliased(&right)]).expect("diff");
                let kept = left_keys.iter().filter(|k| !right_keys.contains(k)).count();
                assert_eq!(diff.length(), kept, "mapdiff size, {case}");
                for k in left_keys {
                    let expected = if right_keys.contains(k) { None } else { entry(&left, k) };
                    assert_eq!(entry(&diff, k), expected, "mapdiff {k:?}, {case}");
                }

                let except = mapexcept(vec![BoxedXvalue::Aliased(&left), BoxedXvalue::Aliased(&names)]).expect("except");
                let only = maponly(vec![BoxedXvalue::Aliased(&left), BoxedXvalue::Aliased(&names)]).expect("only");
                assert_eq!(except.length() + only.length(), left_keys.len(), "partition size, {case}");
                for k in left_keys {
                    let (inside, outside) = if right_keys.contains(k) { (&only, &except) } else { (&except, &only) };
                    assert_eq!(entry(inside, k), entry(&left, k), "partition {k:?}, {case}");
                    assert_eq!(entry(outside, k), None, "partition {k:?}, {case}");
                }

                assert_eq!(left, level_of(left_keys, 10), "left input changed, {case}");
                assert_eq!(right, level_of(right_keys, 100), "right input changed, {case}");
            }
        }
    }

    #[test]
    fn key_arguments_may_be_maps_of_keys() {
        let a = map_of(&[("a", int(1)), ("b", int(2)), ("c", int(3))]);
        let names = map_of(&[("1", s("a")), ("2", s("c"))]);
        let only = maponly(vec![eph(a.copy()), eph(names)]).expect("only");
        assert_eq!(keys_of(&only), ["a", "c"]);
        assert_eq!(
            mapexcept(vec![eph(int(3)), eph(s("a"))]).expect("except"),
            Xvalue::Terminal(Mlrval::Error)
        );
        assert!(mapexcept(vec![]).is_err());
    }

    #[test]
    fn splitnv_infers_and_splitnvx_keeps_text() {
        let split = splitnv(eph(s("a:b:3")), eph(s(":")));
        assert_eq!(split.lookup(&[MapKey::Int(1)]), Some(&s("a")));
        assert_eq!(split.lookup(&[MapKey::Int(3)]), Some(&int(3)));
        let raw = splitnvx(eph(s("a:b:3")), eph(s(":")));
        assert_eq!(raw.lookup(&[MapKey::Int(3)]), Some(&Xvalue::Terminal(Mlrval::String("3".into()))));
        assert_eq!(splitnv(eph(s("")), eph(s(","))), Xvalue::empty_map());
        assert_eq!(splitnv(eph(ab()), eph(s(","))), Xvalue::Terminal(Mlrval::Error));
    }

    #[test]
    fn splitnvx_then_joinv_round_trips() {
        for text in ["a,b,c", "0x10,1.500,-0", "solo", ",,"] {
            let split = splitnvx(eph(s(text)), eph(s(",")));
            let joined = joinv(eph(split), eph(s(",")));
            assert_eq!(joined, s(text), "round trip of {text:?}");
        }
    }

    #[test]
    fn splitkv_keys_by_pair_or_position() {
        let split = splitkv(eph(s("a=1,b=2,c")), eph(s("=")), eph(s(",")));
        assert_eq!(split.lookup(&[key("a")]), Some(&int(1)));
        assert_eq!(split.lookup(&[key("b")]), Some(&int(2)));
        assert_eq!(split.lookup(&[MapKey::Int(3)]), Some(&s("c")));
        let raw = splitkvx(eph(s("x=3=4")), eph(s("=")), eph(s(",")));
        assert_eq!(raw.lookup(&[key("x")]), Some(&Xvalue::Terminal(Mlrval::String("3=4".into()))));
    }

    #[test]
    fn joins_over_maps() {
        let nested = map_of(&[("a", int(1)), ("m", map_of(&[("x", int(2))])), ("c", int(3))]);
        assert_eq!(joink(BoxedXvalue::Aliased(&nested), eph(s(","))), s("a,m,c"));
        assert_eq!(joinv(BoxedXvalue::Aliased(&nested), eph(s(","))), s("1,3"));
        assert_eq!(
            joinkv(BoxedXvalue::Aliased(&nested), eph(s("=")), eph(s(","))),
            s("a=1,c=3")
        );
        assert_eq!(joink(eph(int(1)), eph(s(","))), Xvalue::Terminal(Mlrval::Absent));
        assert_eq!(joink(eph(ab()), eph(ab())), Xvalue::Terminal(Mlrval::Error));
    }

    #[test]
    fn introspection() {
        let nested = map_of(&[("a", int(1)), ("b", map_of(&[("x", int(2)), ("y", int(3))]))]);
        assert_eq!(length(BoxedXvalue::Aliased(&nested)), int(2));
        assert_eq!(length(BoxedXvalue::absent()), int(0));
        assert_eq!(length(eph(int(5))), int(1));
        assert_eq!(depth(BoxedXvalue::Aliased(&nested)), int(2));
        assert_eq!(leafcount(BoxedXvalue::Aliased(&nested)), int(3));
        assert_eq!(
            haskey(BoxedXvalue::Aliased(&nested), eph(s("b"))),
            Xvalue::Terminal(Mlrval::Boolean(true))
        );
        assert_eq!(
            haskey(eph(int(1)), eph(s("b"))),
            Xvalue::Terminal(Mlrval::Boolean(false))
        );
    }

    #[test]
    fn json_functions() {
        assert_eq!(json_encode(eph(ab())), s(r#"{"a":1,"b":2}"#));
        assert_eq!(json_decode(eph(s(r#"{"a":1,"b":2}"#))), ab());
        assert_eq!(json_decode(eph(s("{oops"))), Xvalue::Terminal(Mlrval::Error));
        assert_eq!(
            json_encode_multiline(eph(map_of(&[("a", int(1))])), eph(Xvalue::Terminal(Mlrval::Boolean(true)))),
            s("{\n  \"a\": 1\n}")
        );
    }
}
