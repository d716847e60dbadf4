//! Query parameters and the `@name` → `$N` rewriter.

use std::collections::HashMap;

use regex::Regex;

use crate::error::PoolError;

/// The parameters a caller attaches to a query.
///
/// `Named` is rewritten to `Positional` before it ever reaches the driver
/// (see [`rewrite`]); the driver itself only ever sees [`QueryParams`].
#[derive(Debug, Clone)]
pub enum Values<P> {
    None,
    Positional(Vec<P>),
    Named(HashMap<String, P>),
}

impl<P> Values<P> {
    /// Build a named-parameter map from an iterable of `(key, value)` pairs.
    pub fn named<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, P)>,
    {
        Values::Named(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a positional-parameter list.
    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator<Item = P>,
    {
        Values::Positional(values.into_iter().collect())
    }
}

impl<P> Default for Values<P> {
    fn default() -> Self {
        Values::None
    }
}

/// Parameters in the form the driver actually binds: already positional.
#[derive(Debug, Clone)]
pub enum QueryParams<P> {
    None,
    Positional(Vec<P>),
}

/// A query with its named parameters resolved to `$N` positional form.
#[derive(Debug, Clone)]
pub(crate) struct RewrittenQuery<P> {
    pub text: String,
    pub params: QueryParams<P>,
}

/// The pair of regexes driving named-parameter discovery and rewrite, plus
/// the function mapping a matched token to its lookup key.
///
/// Kept per-[`PgPoolOptions`][crate::PgPoolOptions] instance (never as a
/// lazily-initialized global): a shared global `Regex` used in `find_iter`
/// mode would have its match state interleaved across concurrent callers.
pub(crate) struct NamedParameterRegexes {
    find: Regex,
}

impl NamedParameterRegexes {
    pub(crate) fn new() -> Self {
        Self {
            find: Regex::new(r"@(\w+)\b").expect("static named-parameter regex is valid"),
        }
    }

    /// The key a matched token (e.g. `@foo`) maps to in the values map.
    fn name_of(token: &str) -> &str {
        token.trim_start_matches('@')
    }

    /// A regex matching every occurrence of one specific token (used to
    /// replace every repetition of `@foo` with the same `$N`).
    fn replace_regex_for(token: &str) -> Regex {
        Regex::new(&format!(r"@{}\b", regex::escape(Self::name_of(token))))
            .expect("token-specific regex is valid")
    }

    /// Rewrite `text`/`values` per the named-parameter protocol:
    ///
    /// * positional or absent values pass through unchanged;
    /// * an empty named map passes through as "no parameters";
    /// * otherwise every `@name` token is discovered in first-seen order,
    ///   deduplicated, assigned a shared `$N` index, and every occurrence of
    ///   that token is rewritten — repeated tokens reuse the same index.
    pub(crate) fn rewrite<P>(
        &self,
        text: &str,
        values: Values<P>,
    ) -> Result<RewrittenQuery<P>, PoolError> {
        let mut map = match values {
            Values::None => {
                return Ok(RewrittenQuery {
                    text: text.to_string(),
                    params: QueryParams::None,
                })
            }
            Values::Positional(values) => {
                return Ok(RewrittenQuery {
                    text: text.to_string(),
                    params: QueryParams::Positional(values),
                })
            }
            Values::Named(map) if map.is_empty() => {
                return Ok(RewrittenQuery {
                    text: text.to_string(),
                    params: QueryParams::None,
                })
            }
            Values::Named(map) => map,
        };

        let mut order = Vec::new();
        for m in self.find.find_iter(text) {
            let token = m.as_str();
            let key = Self::name_of(token).to_string();
            if !order.contains(&key) {
                order.push(key);
            }
        }

        if order.is_empty() {
            return Err(PoolError::NoNamedParameters);
        }

        let missing: Vec<String> = order
            .iter()
            .filter(|key| !map.contains_key(key.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PoolError::MissingQueryParameters(missing));
        }

        let mut rewritten = text.to_string();
        let mut params = Vec::with_capacity(order.len());
        for (index, key) in order.iter().enumerate() {
            let token = format!("@{key}");
            let replace_regex = Self::replace_regex_for(&token);
            let placeholder = format!("${}", index + 1);
            rewritten = replace_regex
                .replace_all(&rewritten, placeholder.as_str())
                .into_owned();
            let value = map
                .remove(key.as_str())
                .expect("presence already checked above");
            params.push(value);
        }

        Ok(RewrittenQuery {
            text: rewritten,
            params: QueryParams::Positional(params),
        })
    }
}

impl Default for NamedParameterRegexes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regexes() -> NamedParameterRegexes {
        NamedParameterRegexes::new()
    }

    #[test]
    fn repeated_token_shares_one_index() {
        let rewritten = regexes()
            .rewrite("a=@x and b=@y or c=@x", Values::named([("x", 1), ("y", 2)]))
            .unwrap();
        assert_eq!(rewritten.text, "a=$1 and b=$2 or c=$1");
        match rewritten.params {
            QueryParams::Positional(values) => assert_eq!(values, vec![1, 2]),
            QueryParams::None => panic!("expected positional params"),
        }
    }

    #[test]
    fn scenario_one_named_parameter_substitution() {
        let rewritten = regexes()
            .rewrite(
                "select foo from foobar where id=@id and (bar=@foobar or bar=@foo) and foo=@foo",
                Values::named([
                    ("id", "lorem"),
                    ("foo", "lorem - foo"),
                    ("foobar", "lorem - foobar"),
                    ("unused", "lorem - unused"),
                ]),
            )
            .unwrap();
        assert_eq!(
            rewritten.text,
            "select foo from foobar where id=$1 and (bar=$2 or bar=$3) and foo=$3"
        );
        match rewritten.params {
            QueryParams::Positional(values) => {
                assert_eq!(values, vec!["lorem", "lorem - foobar", "lorem - foo"])
            }
            QueryParams::None => panic!("expected positional params"),
        }
    }

    #[test]
    fn scenario_two_missing_named_parameter() {
        let err = regexes()
            .rewrite(
                "select * from foobar where id=@id",
                Values::named([("unused", "x")]),
            )
            .unwrap_err();
        assert_eq!(err.code(), "ERR_PG_QUERY_MISSING_QUERY_PARAMETER");
        assert_eq!(err.to_string(), "Missing query parameter(s): id");
    }

    #[test]
    fn empty_named_map_passes_through_as_no_parameters() {
        let rewritten = regexes()
            .rewrite("select 1", Values::<i32>::Named(HashMap::new()))
            .unwrap();
        assert_eq!(rewritten.text, "select 1");
        assert!(matches!(rewritten.params, QueryParams::None));
    }

    #[test]
    fn positional_values_pass_through_unchanged() {
        let rewritten = regexes()
            .rewrite("select * from t where id=$1", Values::positional([7]))
            .unwrap();
        assert_eq!(rewritten.text, "select * from t where id=$1");
        match rewritten.params {
            QueryParams::Positional(values) => assert_eq!(values, vec![7]),
            QueryParams::None => panic!("expected positional params"),
        }
    }

    #[test]
    fn named_map_with_no_tokens_in_text_fails() {
        let err = regexes()
            .rewrite("select 1", Values::named([("id", 1)]))
            .unwrap_err();
        assert_eq!(err.code(), "ERR_PG_QUERY_NO_NAMED_PARAMETERS");
    }

    #[test]
    fn unused_keys_in_values_are_silently_ignored() {
        let rewritten = regexes()
            .rewrite("select @a", Values::named([("a", 1), ("b", 2)]))
            .unwrap();
        assert_eq!(rewritten.text, "select $1");
    }
}
