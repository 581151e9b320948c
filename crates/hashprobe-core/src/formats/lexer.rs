//! Shared nom lexemes for the text unit formats (SII, SUI, MAT)

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, digit0, multispace1, not_line_ending},
    combinator::{map, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, tuple},
    IResult,
};

/// A raw attribute value as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Double-quoted string, escapes resolved
    Quoted(String),
    /// Anything else: numbers, tokens, tuples, unit pointers
    Bare(String),
}

impl RawValue {
    pub fn text(&self) -> &str {
        match self {
            RawValue::Quoted(s) | RawValue::Bare(s) => s,
        }
    }
}

/// Array subscript on an attribute key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIndex {
    /// `key: value`
    Scalar,
    /// `key[]: value`
    Append,
    /// `key[3]: value`
    At(usize),
}

/// Whitespace and comments (`#`, `//`, `/* */`)
pub fn sp(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(tag("#"), not_line_ending)),
            value((), pair(tag("//"), not_line_ending)),
            value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
        ))),
    )(input)
}

pub fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// Class names may be namespaced: `ui::text`
pub fn class_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(word, many0(pair(tag("::"), word))))(input)
}

/// Unit names run to the next whitespace or brace: `.my.unit`, `truck.scania`
pub fn unit_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '{' && c != '}')(input)
}

/// Double-quoted string with `\"`, `\\` and `\n` escapes
pub fn quoted(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('"')(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    loop {
        match chars.next() {
            None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
            Some((i, '"')) => return Ok((&rest[i + 1..], out)),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, c)) => out.push(c),
                None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
            },
            Some((_, c)) => out.push(c),
        }
    }
}

fn tuple_value(input: &str) -> IResult<&str, &str> {
    recognize(tuple((char('('), take_until(")"), char(')'))))(input)
}

fn bare_value(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '{' && c != '}' && c != '"')(input)
}

pub fn raw_value(input: &str) -> IResult<&str, RawValue> {
    alt((
        map(quoted, RawValue::Quoted),
        map(tuple_value, |s: &str| RawValue::Bare(s.to_string())),
        map(bare_value, |s: &str| RawValue::Bare(s.to_string())),
    ))(input)
}

/// `key`, `key[]` or `key[N]`
pub fn key_with_index(input: &str) -> IResult<&str, (&str, KeyIndex)> {
    let (rest, key) = word(input)?;
    let (rest, index) = opt(delimited(char('['), digit0, char(']')))(rest)?;
    let index = match index {
        None => KeyIndex::Scalar,
        Some("") => KeyIndex::Append,
        Some(digits) => match digits.parse::<usize>() {
            Ok(n) => KeyIndex::At(n),
            Err(_) => return Err(nom::Err::Error(Error::new(input, ErrorKind::Digit))),
        },
    };
    Ok((rest, (key, index)))
}

/// `key[idx] : value`
pub fn attribute(input: &str) -> IResult<&str, (&str, KeyIndex, RawValue)> {
    let (rest, (key, index)) = key_with_index(input)?;
    let (rest, _) = sp(rest)?;
    let (rest, _) = char(':')(rest)?;
    let (rest, _) = sp(rest)?;
    let (rest, value) = raw_value(rest)?;
    Ok((rest, (key, index, value)))
}

/// `@include "path"`
pub fn include(input: &str) -> IResult<&str, String> {
    let (rest, _) = tag("@include")(input)?;
    let (rest, _) = sp(rest)?;
    quoted(rest)
}

/// Short excerpt of unparsed input for error messages
pub fn excerpt(rest: &str) -> String {
    rest.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_escapes() {
        let (rest, s) = quoted(r#""a \"b\" c" tail"#).unwrap();
        assert_eq!(s, r#"a "b" c"#);
        assert_eq!(rest, " tail");
        assert!(quoted(r#""unterminated"#).is_err());
        assert_eq!(quoted(r#""""#).unwrap().1, "");
    }

    #[test]
    fn test_comments_are_whitespace() {
        let (rest, _) = sp("  # one\n// two\n/* three\n */ next").unwrap();
        assert_eq!(rest, "next");
    }

    #[test]
    fn test_attribute_forms() {
        let (_, (key, index, value)) = attribute(r#"sounds[]: "a|/b.bank""#).unwrap();
        assert_eq!(key, "sounds");
        assert_eq!(index, KeyIndex::Append);
        assert_eq!(value, RawValue::Quoted("a|/b.bank".into()));

        let (_, (_, index, value)) = attribute("data[2] : (1, 2, 3)").unwrap();
        assert_eq!(index, KeyIndex::At(2));
        assert_eq!(value, RawValue::Bare("(1, 2, 3)".into()));

        let (_, (_, index, value)) = attribute("price: 1200").unwrap();
        assert_eq!(index, KeyIndex::Scalar);
        assert_eq!(value.text(), "1200");
    }

    #[test]
    fn test_class_name_namespaced() {
        assert_eq!(class_name("ui::text : .x").unwrap(), (" : .x", "ui::text"));
        assert_eq!(class_name("vehicle_accessory:").unwrap().1, "vehicle_accessory");
    }
}
