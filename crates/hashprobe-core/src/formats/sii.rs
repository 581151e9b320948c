/// Text SII / SUI parser
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, opt},
    IResult,
};

use super::lexer::{attribute, class_name, excerpt, include, sp, unit_name, KeyIndex, RawValue};
use super::{ParseError, SiiDocument, SiiUnit, SiiValue};

/// Magic prefixes of the binary and encrypted SII encodings
const BINARY_MAGICS: &[(&[u8], &str)] = &[
    (b"BSII", "binary sii"),
    (b"ScsC", "encrypted sii"),
    (b"3nK", "3nK-scrambled sii"),
];

/// Name of the binary encoding when `data` is not text SII
pub fn binary_kind(data: &[u8]) -> Option<&'static str> {
    BINARY_MAGICS
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, kind)| *kind)
}

enum Item<'a> {
    Include(String),
    Unit(ParsedUnit<'a>),
    Attribute(&'a str, KeyIndex, RawValue),
}

struct ParsedUnit<'a> {
    class: &'a str,
    name: &'a str,
    body: Vec<BodyItem<'a>>,
}

enum BodyItem<'a> {
    Include(String),
    Attribute(&'a str, KeyIndex, RawValue),
}

fn body_item(input: &str) -> IResult<&str, BodyItem<'_>> {
    alt((
        map(include, BodyItem::Include),
        map(attribute, |(k, i, v)| BodyItem::Attribute(k, i, v)),
    ))(input)
}

fn unit(input: &str) -> IResult<&str, ParsedUnit<'_>> {
    let (rest, class) = class_name(input)?;
    let (rest, _) = sp(rest)?;
    let (rest, _) = char(':')(rest)?;
    let (rest, _) = sp(rest)?;
    let (rest, name) = unit_name(rest)?;
    let (rest, _) = sp(rest)?;
    let (mut rest, _) = char('{')(rest)?;

    let mut body = Vec::new();
    loop {
        let (r, _) = sp(rest)?;
        if let Ok((r, _)) = char::<_, nom::error::Error<&str>>('}')(r) {
            return Ok((r, ParsedUnit { class, name, body }));
        }
        let (r, item) = body_item(r)?;
        body.push(item);
        rest = r;
    }
}

fn item(input: &str) -> IResult<&str, Item<'_>> {
    alt((
        map(include, Item::Include),
        map(unit, Item::Unit),
        map(attribute, |(k, i, v)| Item::Attribute(k, i, v)),
    ))(input)
}

fn to_value(raw: RawValue) -> SiiValue {
    match raw {
        RawValue::Quoted(s) => SiiValue::Str(s),
        RawValue::Bare(s) => SiiValue::Other(s),
    }
}

/// Apply one attribute line to a unit, folding array forms into `SiiValue::List`
fn set_attribute(unit: &mut SiiUnit, key: &str, index: KeyIndex, raw: RawValue) {
    let value = to_value(raw);
    let slot = unit.attributes.iter().position(|(k, _)| k == key);

    match index {
        KeyIndex::Scalar => match slot {
            // `key: 3` next to `key[]` entries is the element count
            Some(i) if matches!(unit.attributes[i].1, SiiValue::List(_)) => {}
            Some(i) => unit.attributes[i].1 = value,
            None => unit.attributes.push((key.to_string(), value)),
        },
        KeyIndex::Append | KeyIndex::At(_) => {
            let i = match slot {
                Some(i) => {
                    if !matches!(unit.attributes[i].1, SiiValue::List(_)) {
                        unit.attributes[i].1 = SiiValue::List(Vec::new());
                    }
                    i
                }
                None => {
                    unit.attributes
                        .push((key.to_string(), SiiValue::List(Vec::new())));
                    unit.attributes.len() - 1
                }
            };
            if let SiiValue::List(items) = &mut unit.attributes[i].1 {
                match index {
                    KeyIndex::At(n) if n < items.len() => items[n] = value,
                    _ => items.push(value),
                }
            }
        }
    }
}

/// Parse a text SII or SUI document.
///
/// The `SiiNunit { }` wrapper is optional so that SUI fragments, which may hold bare
/// attributes, parse with the same grammar. Bare attributes outside any unit are collected
/// into a unit with an empty class and name.
pub fn parse_document(text: &str) -> Result<SiiDocument, ParseError> {
    let syntax = |rest: &str| ParseError::Syntax(excerpt(rest));

    let (mut rest, _) = sp(text).map_err(|_| syntax(text))?;
    let (r, wrapped) = opt(tag::<_, _, nom::error::Error<&str>>("SiiNunit"))(rest)
        .map_err(|_| syntax(rest))?;
    rest = r;
    if wrapped.is_some() {
        let (r, _) = sp(rest).map_err(|_| syntax(rest))?;
        let (r, _) =
            char::<_, nom::error::Error<&str>>('{')(r).map_err(|_| syntax(r))?;
        rest = r;
    }

    let mut doc = SiiDocument::default();
    let mut loose = SiiUnit::default();

    loop {
        let (r, _) = sp(rest).map_err(|_| syntax(rest))?;
        rest = r;
        if rest.is_empty() {
            break;
        }
        if wrapped.is_some() && rest.starts_with('}') {
            let (r, _) = sp(&rest[1..]).map_err(|_| syntax(rest))?;
            if !r.is_empty() {
                return Err(syntax(r));
            }
            rest = r;
            break;
        }
        let (r, parsed) = item(rest).map_err(|_| syntax(rest))?;
        rest = r;
        match parsed {
            Item::Include(path) => doc.includes.push(path),
            Item::Attribute(key, index, value) => set_attribute(&mut loose, key, index, value),
            Item::Unit(parsed) => {
                let mut unit = SiiUnit::new(parsed.class, parsed.name);
                for body_item in parsed.body {
                    match body_item {
                        BodyItem::Include(path) => doc.includes.push(path),
                        BodyItem::Attribute(key, index, value) => {
                            set_attribute(&mut unit, key, index, value)
                        }
                    }
                }
                doc.units.push(unit);
            }
        }
    }

    if !rest.is_empty() {
        return Err(syntax(rest));
    }
    if !loose.attributes.is_empty() {
        doc.units.push(loose);
    }
    Ok(doc)
}
