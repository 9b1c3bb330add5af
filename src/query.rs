//! The DACP query language: the infix `'prop:value'` grammar remotes send
//! in the `query=` parameter, and its evaluation against an
//! [`IndexedCollection`](crate::model::IndexedCollection).
//!
//! Grounded on `euphony/query.py`'s shlex-based evaluator for semantics
//! (operator precedence, wildcard matching, value coercion) and on the
//! teacher's `mpd_protocol/command_parser/query.rs` for how to express a
//! small infix grammar with `peg`.

use percent_encoding::percent_decode_str;

use crate::model::IndexedCollection;

#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Equals(String, String),
    NotEquals(String, String),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("could not parse query {raw:?}: {message}")]
    Syntax { raw: String, message: String },
}

/// Parse a raw DACP query string into an [`Ast`].
///
/// Remotes send spaces in place of `+` inside the query string itself
/// (the `+` that separates AND-terms is distinct from a literal space in
/// a value), so space-to-`+` substitution happens before lexing, exactly
/// as `query.py`'s `tokenize` does.
pub fn parse(raw: &str) -> Result<Ast, QueryError> {
    let normalized = raw.replace(' ', "+");
    grammar::query(&normalized).map_err(|e| QueryError::Syntax {
        raw: raw.to_string(),
        message: e.to_string(),
    })
}

peg::parser! {
    grammar grammar() for str {
        pub rule query() -> Ast = or_expr()

        rule or_expr() -> Ast
            = first:and_expr() rest:("," a:and_expr() { a })* {
                rest.into_iter().fold(first, |acc, n| Ast::Or(Box::new(acc), Box::new(n)))
            }

        rule and_expr() -> Ast
            = first:term() rest:("+" t:term() { t })* {
                rest.into_iter().fold(first, |acc, n| Ast::And(Box::new(acc), Box::new(n)))
            }

        rule term() -> Ast
            = "(" _ e:or_expr() _ ")" { e }
            / equality()

        rule equality() -> Ast
            = "'" prop:property() neg:"!"? ":" value:value() "'" {
                let value = decode_value(&value);
                if neg.is_some() {
                    Ast::NotEquals(prop.to_string(), value)
                } else {
                    Ast::Equals(prop.to_string(), value)
                }
            }

        rule property() -> &'input str
            = $(['a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-']+)

        rule value() -> &'input str
            = $((!"'" [_])*)

        rule _() = [' ']*
    }
}

fn decode_value(raw: &str) -> String {
    // DACP query values are URL-encoded (spaces already turned into `+`
    // at the top level, everything else percent-encoded).
    let decoded = percent_decode_str(&raw.replace('+', " ")).decode_utf8_lossy().into_owned();
    coerce_numeric(&decoded)
}

/// `query.py` tries `int(value)` then `int(value, 16)` before giving up
/// and keeping the value as a string, so a hex literal like `0x7B`
/// compares equal to the decimal `123` an indexed property stores.
fn coerce_numeric(value: &str) -> String {
    if let Ok(n) = value.parse::<i64>() {
        return n.to_string();
    }
    let hex = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
    match i64::from_str_radix(hex, 16) {
        Ok(n) => n.to_string(),
        Err(_) => value.to_string(),
    }
}

/// Evaluate a parsed query against an indexed collection, returning the
/// matching indices. `Equals` against a property/value pair that no
/// element carries at all is an empty result, never an error -- see
/// spec.md §9's note on replacing the source's exception-driven miss
/// handling with plain set algebra.
pub fn evaluate<T>(ast: &Ast, collection: &IndexedCollection<T>) -> std::collections::BTreeSet<usize> {
    use std::collections::BTreeSet;
    match ast {
        Ast::Equals(prop, value) => collection.matching(prop, value),
        Ast::NotEquals(prop, value) => {
            let all: BTreeSet<usize> = (0..collection.len()).collect();
            let matching = collection.matching(prop, value);
            all.difference(&matching).copied().collect()
        }
        Ast::And(a, b) => {
            let left = evaluate(a, collection);
            let right = evaluate(b, collection);
            left.intersection(&right).copied().collect()
        }
        Ast::Or(a, b) => {
            let left = evaluate(a, collection);
            let right = evaluate(b, collection);
            left.union(&right).copied().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_equality() {
        let ast = parse("'dmap.itemname:Foo'").unwrap();
        assert_eq!(ast, Ast::Equals("dmap.itemname".into(), "Foo".into()));
    }

    #[test]
    fn parses_negation() {
        let ast = parse("'dmap.itemname!:Foo'").unwrap();
        assert_eq!(ast, Ast::NotEquals("dmap.itemname".into(), "Foo".into()));
    }

    #[test]
    fn parses_and_of_two_terms() {
        let ast = parse("'daap.songartist:Bar'+'daap.songalbum:Baz'").unwrap();
        assert_eq!(
            ast,
            Ast::And(
                Box::new(Ast::Equals("daap.songartist".into(), "Bar".into())),
                Box::new(Ast::Equals("daap.songalbum".into(), "Baz".into())),
            )
        );
    }

    #[test]
    fn parses_grouped_or() {
        let ast = parse("('daap.songartist:Bar'),('daap.songartist:Baz')").unwrap();
        assert_eq!(
            ast,
            Ast::Or(
                Box::new(Ast::Equals("daap.songartist".into(), "Bar".into())),
                Box::new(Ast::Equals("daap.songartist".into(), "Baz".into())),
            )
        );
    }

    #[test]
    fn decodes_percent_and_plus_encoded_values() {
        let ast = parse("'daap.songartist:Spinal+Tap%21'").unwrap();
        assert_eq!(ast, Ast::Equals("daap.songartist".into(), "Spinal Tap!".into()));
    }

    fn item(id: u32, name: &str) -> crate::model::Item {
        crate::model::Item {
            id,
            name: name.to_string(),
            artist: String::new(),
            artist_id: 0,
            album: String::new(),
            album_id: 0,
            track: 0,
            composer: String::new(),
            genre: String::new(),
            year: String::new(),
            time_ms: 0,
            path: format!("{name}.flac"),
        }
    }

    fn sample_items() -> IndexedCollection<crate::model::Item> {
        let mut c = IndexedCollection::new();
        c.push(item(1, "Alpha"));
        c.push(item(2, "Beta"));
        c.push(item(3, "Gamma"));
        c
    }

    #[test]
    fn scenario_equals_selects_single_item() {
        let items = sample_items();
        let ast = parse("'dmap.itemname:Beta'").unwrap();
        assert_eq!(evaluate(&ast, &items), std::collections::BTreeSet::from([1]));
    }

    #[test]
    fn scenario_or_selects_two_items() {
        let items = sample_items();
        let ast = parse("('dmap.itemname:Alpha'),('dmap.itemname:Gamma')").unwrap();
        assert_eq!(evaluate(&ast, &items), std::collections::BTreeSet::from([0, 2]));
    }

    #[test]
    fn scenario_not_equals_excludes_one_item() {
        let items = sample_items();
        let ast = parse("'dmap.itemname!:Beta'").unwrap();
        assert_eq!(evaluate(&ast, &items), std::collections::BTreeSet::from([0, 2]));
    }

    #[test]
    fn hex_value_matches_the_same_item_as_its_decimal_form() {
        let items = sample_items();
        let decimal = parse("'dmap.itemid:2'").unwrap();
        let hex = parse("'dmap.itemid:0x2'").unwrap();
        assert_eq!(evaluate(&decimal, &items), evaluate(&hex, &items));
        assert_eq!(evaluate(&hex, &items), std::collections::BTreeSet::from([1]));
    }
}
