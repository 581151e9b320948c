/// Text material (`.mat`) parser
///
/// Materials are nested `key : "value" { ... }` blocks. Current materials declare textures as
/// `texture : "texture_base" { source : "..." }` inside an `effect` block; legacy ones use flat
/// `texture : "..."` / `texture[N] : "..."` attributes on a `material` block.
use std::collections::HashMap;

use nom::{character::complete::char, IResult};

use super::lexer::{attribute, excerpt, sp, KeyIndex, RawValue};
use super::{ParseError, TextureSlot};

/// A `key : value { ... }` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub key: String,
    pub value: String,
    pub attributes: Vec<(String, KeyIndex, String)>,
    pub children: Vec<Block>,
}

/// Parse the attributes and child blocks after an opening `{`, through the closing `}`
fn block_body(mut input: &str) -> IResult<&str, (Vec<(String, KeyIndex, String)>, Vec<Block>)> {
    let mut attributes = Vec::new();
    let mut children = Vec::new();
    loop {
        let (rest, _) = sp(input)?;
        if let Ok((rest, _)) = char::<_, nom::error::Error<&str>>('}')(rest) {
            return Ok((rest, (attributes, children)));
        }
        let (rest, (key, index, value)) = attribute(rest)?;
        let (after_ws, _) = sp(rest)?;
        if let Ok((inner, _)) = char::<_, nom::error::Error<&str>>('{')(after_ws) {
            let (rest, (attrs, kids)) = block_body(inner)?;
            children.push(Block {
                key: key.to_string(),
                value: value.text().to_string(),
                attributes: attrs,
                children: kids,
            });
            input = rest;
        } else {
            attributes.push((key.to_string(), index, value.text().to_string()));
            input = rest;
        }
    }
}

fn block(input: &str) -> IResult<&str, Block> {
    let (rest, (key, _, value)) = attribute(input)?;
    let (rest, _) = sp(rest)?;
    let (rest, _) = char('{')(rest)?;
    let (rest, (attributes, children)) = block_body(rest)?;
    let value = match value {
        RawValue::Quoted(s) | RawValue::Bare(s) => s,
    };
    Ok((
        rest,
        Block {
            key: key.to_string(),
            value,
            attributes,
            children,
        },
    ))
}

/// Parse a material file into its top-level block
pub fn parse_material(text: &str) -> Result<Block, ParseError> {
    let syntax = |rest: &str| ParseError::Syntax(excerpt(rest));
    let (rest, _) = sp(text).map_err(|_| syntax(text))?;
    let (rest, root) = block(rest).map_err(|_| syntax(rest))?;
    let (rest, _) = sp(rest).map_err(|_| syntax(rest))?;
    if !rest.is_empty() {
        return Err(syntax(rest));
    }
    Ok(root)
}

fn collect_slots(block: &Block, slots: &mut Vec<TextureSlot>) {
    for (key, _, value) in &block.attributes {
        if key == "texture" {
            let mut attributes = HashMap::new();
            attributes.insert("source".to_string(), value.clone());
            slots.push(TextureSlot {
                name: None,
                attributes,
            });
        }
    }
    for child in &block.children {
        if child.key == "texture" {
            slots.push(TextureSlot {
                name: Some(child.value.clone()),
                attributes: child
                    .attributes
                    .iter()
                    .map(|(k, _, v)| (k.clone(), v.clone()))
                    .collect(),
            });
        } else {
            collect_slots(child, slots);
        }
    }
}

/// Every texture binding in a material, new-style blocks and legacy attributes alike
pub fn texture_slots(text: &str) -> Result<Vec<TextureSlot>, ParseError> {
    let root = parse_material(text)?;
    let mut slots = Vec::new();
    collect_slots(&root, &mut slots);
    Ok(slots)
}
