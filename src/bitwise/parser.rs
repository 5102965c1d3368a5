// nom grammar for the memory layout language
//
//   u8 foo;  ul16 bar[4];  u8 hi:4, lo:4;
//   struct name { ... };  struct name var[N];  struct { ... } var;
//   union { ... } var;
//   #seekto 0x100;  #seek 2;  #printoffset "label";

use super::error::{BitwiseError, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace1, not_line_ending, satisfy},
    combinator::{cut, map, map_res, not, opt, value},
    error::Error,
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

type Res<'a, T> = IResult<&'a str, T>;

/// One statement of a layout block
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// 1-based source line the statement starts on
    pub line: usize,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// `type name;` or `type name[N];`
    Field { type_name: String, decl: Declarator },
    /// `type a:N, b:M, ...;`
    Bitfield {
        type_name: String,
        fields: Vec<(String, u32)>,
    },
    /// `struct name { ... };`
    StructDef { name: String, body: Vec<Item> },
    /// `struct name var;` or `struct { ... } var;`
    StructDecl {
        source: StructSource,
        decl: Declarator,
    },
    /// `union { ... } var;`
    Union { body: Vec<Item>, decl: Declarator },
    Seekto(usize),
    Seek(usize),
    PrintOffset(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructSource {
    Inline(Vec<Item>),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declarator {
    pub name: String,
    pub count: Option<usize>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn comment(i: &str) -> Res<'_, ()> {
    alt((
        value((), (tag("//"), not_line_ending)),
        value((), (tag("/*"), take_until("*/"), tag("*/"))),
    ))
    .parse(i)
}

fn ws(i: &str) -> Res<'_, ()> {
    value((), many0(alt((value((), multispace1), comment)))).parse(i)
}

fn lex<'a, P>(parser: P) -> impl Parser<&'a str, Output = P::Output, Error = Error<&'a str>>
where
    P: Parser<&'a str, Error = Error<&'a str>>,
{
    preceded(ws, parser)
}

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    lex(terminated(tag(word), not(satisfy(is_word_char))))
}

fn symbol(i: &str) -> Res<'_, &str> {
    lex(take_while1(is_word_char)).parse(i)
}

fn count(i: &str) -> Res<'_, usize> {
    lex(alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |h: &str| {
            usize::from_str_radix(h, 16)
        }),
        map_res(digit1, |d: &str| d.parse::<usize>()),
    )))
    .parse(i)
}

fn string(i: &str) -> Res<'_, &str> {
    lex(delimited(char('"'), take_while(|c: char| c != '"'), char('"'))).parse(i)
}

fn declarator(i: &str) -> Res<'_, Declarator> {
    map(
        (symbol, opt(delimited(lex(char('[')), count, lex(char(']'))))),
        |(name, count)| Declarator {
            name: name.to_string(),
            count,
        },
    )
    .parse(i)
}

fn bitdef(i: &str) -> Res<'_, (String, u32)> {
    map_res((symbol, lex(char(':')), count), |(name, _, bits)| {
        u32::try_from(bits).map(|bits| (name.to_string(), bits))
    })
    .parse(i)
}

fn definition(i: &str) -> Res<'_, ItemKind> {
    let (i, type_name) = symbol(i)?;
    let (i, kind) = alt((
        map(separated_list1(lex(char(',')), bitdef), |fields| {
            ItemKind::Bitfield {
                type_name: type_name.to_string(),
                fields,
            }
        }),
        map(declarator, |decl| ItemKind::Field {
            type_name: type_name.to_string(),
            decl,
        }),
    ))
    .parse(i)?;
    let (i, _) = cut(lex(char(';'))).parse(i)?;
    Ok((i, kind))
}

fn block(i: &str) -> Res<'_, Vec<Item>> {
    delimited(lex(char('{')), many0(item), lex(char('}'))).parse(i)
}

fn struct_item(i: &str) -> Res<'_, ItemKind> {
    preceded(
        keyword("struct"),
        cut(alt((
            map((block, declarator, lex(char(';'))), |(body, decl, _)| {
                ItemKind::StructDecl {
                    source: StructSource::Inline(body),
                    decl,
                }
            }),
            map((symbol, block, lex(char(';'))), |(name, body, _)| {
                ItemKind::StructDef {
                    name: name.to_string(),
                    body,
                }
            }),
            map((symbol, declarator, lex(char(';'))), |(name, decl, _)| {
                ItemKind::StructDecl {
                    source: StructSource::Named(name.to_string()),
                    decl,
                }
            }),
        ))),
    )
    .parse(i)
}

fn union_item(i: &str) -> Res<'_, ItemKind> {
    preceded(
        keyword("union"),
        cut(map((block, declarator, lex(char(';'))), |(body, decl, _)| {
            ItemKind::Union { body, decl }
        })),
    )
    .parse(i)
}

fn directive(i: &str) -> Res<'_, ItemKind> {
    preceded(
        lex(char('#')),
        cut(terminated(
            alt((
                map(preceded(keyword("seekto"), count), ItemKind::Seekto),
                map(preceded(keyword("seek"), count), ItemKind::Seek),
                map(preceded(keyword("printoffset"), string), |label: &str| {
                    ItemKind::PrintOffset(label.to_string())
                }),
            )),
            lex(char(';')),
        )),
    )
    .parse(i)
}

fn item(i: &str) -> Res<'_, Item> {
    let (i, _) = ws(i)?;
    // Position is recorded as remaining length and turned into a line later
    let remaining = i.len();
    let (i, kind) = alt((directive, struct_item, union_item, definition)).parse(i)?;
    Ok((
        i,
        Item {
            line: remaining,
            kind,
        },
    ))
}

/// Line number of the byte at `pos` in `source`
fn line_of(source: &str, pos: usize) -> usize {
    source[..pos].matches('\n').count() + 1
}

fn resolve_lines(items: &mut [Item], source: &str) {
    for item in items {
        item.line = line_of(source, source.len() - item.line);
        match &mut item.kind {
            ItemKind::StructDef { body, .. }
            | ItemKind::Union { body, .. }
            | ItemKind::StructDecl {
                source: StructSource::Inline(body),
                ..
            } => resolve_lines(body, source),
            _ => {}
        }
    }
}

fn syntax_error(source: &str, rest: &str) -> BitwiseError {
    let pos = source.len() - rest.len();
    let token: String = rest
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(16)
        .collect();

    if token.is_empty() {
        // Ran out of input: blame the last line that had content
        let line = line_of(source, source[..pos].trim_end().len());
        BitwiseError::syntax(line, "unexpected end of input")
    } else {
        let skipped = rest.len() - rest.trim_start().len();
        BitwiseError::syntax(
            line_of(source, pos + skipped),
            format!("unexpected `{}`", token),
        )
    }
}

/// Parse layout text into its statement tree
pub fn parse_schema(source: &str) -> Result<Vec<Item>> {
    match terminated(many0(item), ws).parse(source) {
        Ok(("", mut items)) => {
            resolve_lines(&mut items, source);
            Ok(items)
        }
        Ok((rest, _)) => Err(syntax_error(source, rest)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(syntax_error(source, e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(source, "")),
    }
}
