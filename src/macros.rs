// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// heavily inspired by [serde_json]'s `json!` macro
// [serde_json]: https://github.com/serde-rs/json

#[cfg(doc)]
use crate::ValueSend;

macro_rules! hash_map {
    () => {std::collections::HashMap::new()};
    ( $($key:expr => $value:expr),* $(,)? ) => {
        {
            let mut m = std::collections::HashMap::with_capacity(hash_map!(_capacity($($value),*)));
            $(
                m.insert($key, $value);
            )*
            m
        }
    };
    ( _capacity() ) => (0usize);
    ( _capacity($x:tt) ) => (1usize);
    ( _capacity($x:tt, $($xs:tt),*) ) => (1usize + hash_map!(_capacity($($xs),*)));
}

pub(crate) use hash_map;

/// Short notation for building a [`ValueSend`].
///
/// See [`value_map!`] for the common case of building a parameter/metadata map.
#[macro_export(local_inner_macros)]
macro_rules! value {
    // Hide distracting implementation details from the generated rustdoc.
    ($($value:tt)+) => {
        __value_internal!($($value)+)
    };
}

/// Short notation for building a `HashMap<String, ValueSend>`, e.g. for query parameters or
/// transaction metadata.
///
/// # Examples
/// ```
/// use std::collections::HashMap;
/// use neo4j::{value_map, ValueSend};
///
/// let mut map = HashMap::new();
/// map.insert(String::from("foo"), ValueSend::Integer(1));
/// map.insert(String::from("bar"), ValueSend::Null);
/// map.insert(String::from("baz"), ValueSend::List(vec![ValueSend::Integer(1)]));
///
/// assert_eq!(map, value_map!({"foo": 1, "bar": null, "baz": [1]}));
/// ```
#[macro_export(local_inner_macros)]
macro_rules! value_map {
    ({$(,)?}) => {
        std::collections::HashMap::new()
    };
    ({ $($tt:tt)+ }) => {
        {
            let mut map = std::collections::HashMap::new();
            __value_internal!(@map map () ($($tt)+) ($($tt)+));
            map
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __value_internal {
    //////////////////////////////////////////////////////////////////////////
    // TT muncher for parsing the inside of a list [...].
    // Produces a Vec<ValueSend> of the elements.
    //
    // Must be invoked as: __value_internal!(@list [] $($tt)*)
    //////////////////////////////////////////////////////////////////////////

    // Done with trailing comma.
    (@list [$($elems:expr,)*]) => {
        vec![$($elems,)*]
    };

    // Done without trailing comma.
    (@list [$($elems:expr),*]) => {
        vec![$($elems),*]
    };

    // Next element is `null`.
    (@list [$($elems:expr,)*] null $($rest:tt)*) => {
        $crate::__value_internal!(@list [$($elems,)* $crate::__value_internal!(null)] $($rest)*)
    };

    // Next element is a list.
    (@list [$($elems:expr,)*] [$($array:tt)*] $($rest:tt)*) => {
        $crate::__value_internal!(@list [$($elems,)* $crate::__value_internal!([$($array)*])] $($rest)*)
    };

    // Next element is a map.
    (@list [$($elems:expr,)*] {$($map:tt)*} $($rest:tt)*) => {
        $crate::__value_internal!(@list [$($elems,)* $crate::__value_internal!({$($map)*})] $($rest)*)
    };

    // Next element are bytes.
    (@list [$($elems:expr,)*] bytes($($bytes:tt)*) $($rest:tt)*) => {
        $crate::__value_internal!(@list [$($elems,)* $crate::__value_internal!(bytes($($bytes)*))] $($rest)*)
    };

    // Next element is an expression followed by comma.
    (@list [$($elems:expr,)*] $next:expr, $($rest:tt)*) => {
        $crate::__value_internal!(@list [$($elems,)* $crate::__value_internal!($next),] $($rest)*)
    };

    // Last element is an expression with no trailing comma.
    (@list [$($elems:expr,)*] $last:expr) => {
        $crate::__value_internal!(@list [$($elems,)* $crate::__value_internal!($last)])
    };

    // Comma after the most recent element.
    (@list [$($elems:expr),*] , $($rest:tt)*) => {
        $crate::__value_internal!(@list [$($elems,)*] $($rest)*)
    };

    // Unexpected token after most recent element.
    (@list [$($elems:expr),*] $unexpected:tt $($rest:tt)*) => {
        $crate::__value_unexpected!($unexpected)
    };

    //////////////////////////////////////////////////////////////////////////
    // TT muncher for parsing the inside of a map {...}. Each entry is
    // inserted into the given map variable.
    //
    // Must be invoked as: __value_internal!(@map $map () ($($tt)*) ($($tt)*))
    //
    // We require two copies of the input tokens so that we can match on one
    // copy and trigger errors on the other copy.
    //////////////////////////////////////////////////////////////////////////

    // Done.
    (@map $map:ident () () ()) => {};

    // Insert the current entry followed by trailing comma.
    (@map $map:ident [$($key:tt)+] ($value:expr) , $($rest:tt)*) => {
        let _ = $map.insert(($($key)+).into(), $value);
        $crate::__value_internal!(@map $map () ($($rest)*) ($($rest)*));
    };

    // Current entry followed by unexpected token.
    (@map $map:ident [$($key:tt)+] ($value:expr) $unexpected:tt $($rest:tt)*) => {
        $crate::__value_unexpected!($unexpected);
    };

    // Insert the last entry without trailing comma.
    (@map $map:ident [$($key:tt)+] ($value:expr)) => {
        let _ = $map.insert(($($key)+).into(), $value);
    };

    // Next value is `null`.
    (@map $map:ident ($($key:tt)+) (: null $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map [$($key)+] ($crate::__value_internal!(null)) $($rest)*);
    };

    // Next value is a list.
    (@map $map:ident ($($key:tt)+) (: [$($array:tt)*] $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map [$($key)+] ($crate::__value_internal!([$($array)*])) $($rest)*);
    };

    // Next value is a map.
    (@map $map:ident ($($key:tt)+) (: {$($mapp:tt)*} $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map [$($key)+] ($crate::__value_internal!({$($mapp)*})) $($rest)*);
    };

    // Next value are bytes.
    (@map $map:ident ($($key:tt)+) (: bytes( $($bytes:tt)* ) $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map [$($key)+] ($crate::__value_internal!(bytes($($bytes)*))) $($rest)*);
    };

    // Next value is an expression followed by comma.
    (@map $map:ident ($($key:tt)+) (: $value:expr , $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map [$($key)+] ($crate::__value_internal!($value)) , $($rest)*);
    };

    // Last value is an expression with no trailing comma.
    (@map $map:ident ($($key:tt)+) (: $value:expr) $copy:tt) => {
        $crate::__value_internal!(@map $map [$($key)+] ($crate::__value_internal!($value)));
    };

    // Missing value for last entry. Trigger a reasonable error message.
    (@map $map:ident ($($key:tt)+) (:) $copy:tt) => {
        // "unexpected end of macro invocation"
        $crate::__value_internal!();
    };

    // Missing colon and value for last entry. Trigger a reasonable error
    // message.
    (@map $map:ident ($($key:tt)+) () $copy:tt) => {
        // "unexpected end of macro invocation"
        $crate::__value_internal!();
    };

    // Misplaced colon. Trigger a reasonable error message.
    (@map $map:ident () (: $($rest:tt)*) ($colon:tt $($copy:tt)*)) => {
        // Takes no arguments so "no rules expected the token `:`".
        $crate::__value_unexpected!($colon);
    };

    // Found a comma inside a key. Trigger a reasonable error message.
    (@map $map:ident ($($key:tt)*) (, $($rest:tt)*) ($comma:tt $($copy:tt)*)) => {
        // Takes no arguments so "no rules expected the token `,`".
        $crate::__value_unexpected!($comma);
    };

    // Key is fully parenthesized. This avoids clippy double_parens false
    // positives because the parenthesization may be necessary here.
    (@map $map:ident () (($key:expr) : $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map ($key) (: $($rest)*) (: $($rest)*));
    };

    // Munch a token into the current key.
    (@map $map:ident ($($key:tt)*) ($tt:tt $($rest:tt)*) $copy:tt) => {
        $crate::__value_internal!(@map $map ($($key)* $tt) ($($rest)*) ($($rest)*));
    };

    //////////////////////////////////////////////////////////////////////////
    // The main implementation.
    //
    // Must be invoked as: __value_internal!($($value)+)
    //////////////////////////////////////////////////////////////////////////

    (null) => {
        $crate::ValueSend::Null
    };

    ([]) => {
        $crate::ValueSend::List(vec![])
    };

    ([ $($tt:tt)+ ]) => {
        $crate::ValueSend::List($crate::__value_internal!(@list [] $($tt)+))
    };

    ({$(,)?}) => {
        $crate::ValueSend::Map(std::collections::HashMap::new())
    };

    ({ $($tt:tt)+ }) => {
        $crate::ValueSend::Map({
            let mut map = std::collections::HashMap::new();
            $crate::__value_internal!(@map map () ($($tt)+) ($($tt)+));
            map
        })
    };

    (bytes()) => {
        $crate::ValueSend::Bytes(vec![])
    };

    (bytes( $($tt:tt),+ $(,)?)) => {
        $crate::ValueSend::Bytes(vec![$($tt),+])
    };

    // Any Into<ValueSend> type: numbers, strings, struct literals, variables etc.
    // Must be below every other rule.
    ($other:expr) => {
        $other.into()
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __value_unexpected {
    () => {};
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::value::spatial::*;
    use crate::ValueSend;

    #[test]
    fn test_null_map() {
        assert_eq!(
            value_map!({"a": null}),
            std::collections::HashMap::from([(String::from("a"), ValueSend::Null)]),
        )
    }

    #[rstest]
    #[case(__value_internal!(true), ValueSend::Boolean(true))]
    #[case(__value_internal!(false), ValueSend::Boolean(false))]
    fn test_boolean(#[case] input: ValueSend, #[case] output: ValueSend) {
        dbg!(&input, &output);
        assert_eq!(input, output);
    }

    #[rstest]
    #[case(__value_internal!(1), ValueSend::Integer(1))]
    #[case(__value_internal!(-1), ValueSend::Integer(-1))]
    #[case(__value_internal!(1u8), ValueSend::Integer(1))]
    #[case(__value_internal!(1i8), ValueSend::Integer(1))]
    #[case(__value_internal!(-1i8), ValueSend::Integer(-1))]
    #[case(__value_internal!(1u16), ValueSend::Integer(1))]
    #[case(__value_internal!(1i16), ValueSend::Integer(1))]
    #[case(__value_internal!(-1i16), ValueSend::Integer(-1))]
    #[case(__value_internal!(1u32), ValueSend::Integer(1))]
    #[case(__value_internal!(1i32), ValueSend::Integer(1))]
    #[case(__value_internal!(-1i32), ValueSend::Integer(-1))]
    #[case(__value_internal!(1i64), ValueSend::Integer(1))]
    #[case(__value_internal!(-1i64), ValueSend::Integer(-1))]
    #[case(__value_internal!(i64::MAX), ValueSend::Integer(i64::MAX))]
    #[case(__value_internal!(i64::MIN), ValueSend::Integer(i64::MIN))]
    fn test_int(#[case] input: ValueSend, #[case] output: ValueSend) {
        dbg!(&input, &output);
        assert_eq!(input, output);
    }

    #[rstest]
    #[case(__value_internal!(bytes()), ValueSend::Bytes(vec![]))]
    #[case(__value_internal!(bytes(1)), ValueSend::Bytes(vec![1]))]
    #[case(__value_internal!(bytes(1,)), ValueSend::Bytes(vec![1]))]
    fn test_bytes(#[case] input: ValueSend, #[case] output: ValueSend) {
        dbg!(&input, &output);
        assert_eq!(input, output);
    }

    #[rstest]
    #[case(__value_internal!(""), ValueSend::String("".into()))]
    #[case(__value_internal!("foo"), ValueSend::String("foo".into()))]
    #[case(__value_internal!(String::from("foo")), ValueSend::String("foo".into()))]
    fn test_string(#[case] input: ValueSend, #[case] output: ValueSend) {
        dbg!(&input, &output);
        assert_eq!(input, output);
    }

    #[rstest]
    #[case(__value_internal!([]), ValueSend::List(vec![]))]
    #[case(__value_internal!([null]), ValueSend::List(vec![ValueSend::Null]))]
    #[case(
        __value_internal!([1, [2], 3]),
        ValueSend::List(vec![
            ValueSend::Integer(1),
            ValueSend::List(vec![ValueSend::Integer(2)]),
            ValueSend::Integer(3),
        ])
    )]
    fn test_list(#[case] input: ValueSend, #[case] output: ValueSend) {
        dbg!(&input, &output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_map() {
        assert_eq!(
            value_map!({"a": 1, "b": 1., "c": [1, "foo", null], "d": {"bar": false}}),
            std::collections::HashMap::from([
                (String::from("a"), ValueSend::Integer(1)),
                (String::from("b"), ValueSend::Float(1.)),
                (
                    String::from("c"),
                    ValueSend::List(vec![
                        ValueSend::Integer(1),
                        ValueSend::String("foo".into()),
                        ValueSend::Null,
                    ]),
                ),
                (
                    String::from("d"),
                    ValueSend::Map(std::collections::HashMap::from([(
                        String::from("bar"),
                        ValueSend::Boolean(false),
                    )])),
                ),
            ]),
        )
    }

    #[rstest]
    #[case(
        __value_internal!(Cartesian2D::new(1., 2.)),
        ValueSend::Cartesian2D(Cartesian2D::new(1., 2.))
    )]
    #[case(
        __value_internal!(Cartesian3D::new(1., 2., 3.)),
        ValueSend::Cartesian3D(Cartesian3D::new(1., 2., 3.))
    )]
    fn test_structs(#[case] input: ValueSend, #[case] output: ValueSend) {
        dbg!(&input, &output);
        assert_eq!(input, output);
    }
}
