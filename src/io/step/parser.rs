// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Part 21 exchange structure parser using pest

use crate::error::{Error, Result};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::collections::BTreeMap;

#[derive(Parser)]
#[grammar = "io/step/step.pest"]
struct StepParser;

/// Attribute value of an entity record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Ref(u64),
    Real(f64),
    Integer(i64),
    String(String),
    Enum(String),
    List(Vec<Value>),
    /// Typed parameter such as `LENGTH_MEASURE(1.0)`
    Typed(String, Vec<Value>),
    Binary(String),
    Omitted,
    Derived,
}

impl Value {
    pub fn as_entity(&self) -> Option<u64> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Typed(_, inner) if inner.len() == 1 => inner[0].as_real(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// `.T.` / `.F.`; anything else (including `.U.`) is `None`
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_enum()? {
            "T" => Some(true),
            "F" => Some(false),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Entity references of a list, skipping anything else
    pub fn refs(&self) -> Vec<u64> {
        self.as_list()
            .map(|items| items.iter().filter_map(Value::as_entity).collect())
            .unwrap_or_default()
    }

    pub fn reals(&self) -> Vec<f64> {
        self.as_list()
            .map(|items| items.iter().filter_map(Value::as_real).collect())
            .unwrap_or_default()
    }
}

/// One partial record; simple instances have exactly one
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub params: Vec<Value>,
}

impl Record {
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }

    pub fn entity(&self, index: usize) -> Option<u64> {
        self.param(index).and_then(Value::as_entity)
    }

    pub fn real(&self, index: usize) -> Option<f64> {
        self.param(index).and_then(Value::as_real)
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        self.param(index).and_then(Value::as_str)
    }

    pub fn boolean(&self, index: usize) -> Option<bool> {
        self.param(index).and_then(Value::as_bool)
    }

    pub fn refs(&self, index: usize) -> Vec<u64> {
        self.param(index).map(Value::refs).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    pub records: Vec<Record>,
}

impl Entity {
    /// Type name of a simple instance, or of the first partial record
    pub fn name(&self) -> &str {
        self.records.first().map_or("", |r| r.name.as_str())
    }

    pub fn is(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    pub fn is_complex(&self) -> bool {
        self.records.len() > 1
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }

    /// The record of a simple instance
    pub fn simple(&self) -> Option<&Record> {
        match self.records.as_slice() {
            [record] => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepFile {
    pub header: Vec<Record>,
    pub entities: BTreeMap<u64, Entity>,
}

impl StepFile {
    pub fn parse(source: &str) -> Result<Self> {
        let mut pairs = StepParser::parse(Rule::file, source)
            .map_err(|e| Error::format(format!("invalid STEP exchange structure: {}", e)))?;
        let mut file = StepFile::default();
        let Some(root) = pairs.next() else {
            return Ok(file);
        };

        for pair in root.into_inner() {
            match pair.as_rule() {
                Rule::header => {
                    for entity in pair.into_inner() {
                        file.header.push(parse_record(entity)?);
                    }
                }
                Rule::data_section => {
                    for instance in pair.into_inner() {
                        if instance.as_rule() != Rule::entity_instance {
                            continue;
                        }
                        let entity = parse_instance(instance)?;
                        if file.entities.insert(entity.id, entity).is_some() {
                            return Err(Error::format("duplicate entity instance name"));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(file)
    }

    pub fn get(&self, id: u64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Entities of a simple type, in instance-name order
    pub fn of_type<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.values().filter(move |e| e.is(name))
    }

    /// First schema named in `FILE_SCHEMA`
    pub fn schema(&self) -> Option<&str> {
        self.header
            .iter()
            .find(|r| r.name == "FILE_SCHEMA")
            .and_then(|r| r.param(0))
            .and_then(Value::as_list)
            .and_then(|l| l.first())
            .and_then(Value::as_str)
    }
}

fn parse_instance(pair: Pair<Rule>) -> Result<Entity> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .ok_or_else(|| Error::format("entity instance without a name"))?;
    let id = parse_id(name.as_str())?;
    let body = inner
        .next()
        .ok_or_else(|| Error::format(format!("entity #{} has no record", id)))?;
    let records = match body.as_rule() {
        Rule::complex_record => body
            .into_inner()
            .map(parse_record)
            .collect::<Result<Vec<_>>>()?,
        _ => vec![parse_record(body)?],
    };
    Ok(Entity { id, records })
}

fn parse_record(pair: Pair<Rule>) -> Result<Record> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .map(|k| k.as_str().to_ascii_uppercase())
        .ok_or_else(|| Error::format("record without a keyword"))?;
    let params = match inner.next() {
        Some(list) => parse_list(list)?,
        None => Vec::new(),
    };
    Ok(Record { name, params })
}

fn parse_list(pair: Pair<Rule>) -> Result<Vec<Value>> {
    pair.into_inner().map(parse_value).collect()
}

fn parse_value(pair: Pair<Rule>) -> Result<Value> {
    let text = pair.as_str();
    Ok(match pair.as_rule() {
        Rule::entity_ref => Value::Ref(parse_id(text)?),
        Rule::real => Value::Real(
            text.parse()
                .map_err(|_| Error::format(format!("invalid real {}", text)))?,
        ),
        Rule::integer => Value::Integer(
            text.parse()
                .map_err(|_| Error::format(format!("invalid integer {}", text)))?,
        ),
        Rule::string => Value::String(decode_string(&text[1..text.len() - 1])),
        Rule::enumeration => Value::Enum(text[1..text.len() - 1].to_ascii_uppercase()),
        Rule::binary => Value::Binary(text[1..text.len() - 1].to_string()),
        Rule::omitted => Value::Omitted,
        Rule::derived => Value::Derived,
        Rule::list => match pair.into_inner().next() {
            Some(list) => Value::List(parse_list(list)?),
            None => Value::List(Vec::new()),
        },
        Rule::typed => {
            let record = parse_record(pair)?;
            Value::Typed(record.name, record.params)
        }
        rule => return Err(Error::format(format!("unexpected {:?} in parameter list", rule))),
    })
}

fn parse_id(text: &str) -> Result<u64> {
    text.trim_start_matches('#')
        .parse()
        .map_err(|_| Error::format(format!("invalid instance name {}", text)))
}

/// Undo quote doubling and the `\X\`, `\X2\`, `\S\` and `\\` escapes
pub(crate) fn decode_string(raw: &str) -> String {
    let text = raw.replace("''", "'");
    if !text.contains('\\') {
        return text;
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        if let Some(tail) = rest.strip_prefix("\\\\") {
            out.push('\\');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            let hex = &tail[..end];
            let units: Vec<u16> = (0..hex.len() / 4)
                .filter_map(|i| u16::from_str_radix(&hex[i * 4..i * 4 + 4], 16).ok())
                .collect();
            out.push_str(&String::from_utf16_lossy(&units));
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(tail) = rest.strip_prefix("\\X\\") {
            match tail.get(..2).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                Some(byte) => {
                    out.push(char::from(byte));
                    rest = &tail[2..];
                }
                None => {
                    out.push('\\');
                    rest = &rest[1..];
                }
            }
        } else if let Some(tail) = rest.strip_prefix("\\S\\") {
            match tail.chars().next() {
                Some(c) => {
                    out.push(char::from_u32(c as u32 + 128).unwrap_or(c));
                    rest = &tail[c.len_utf8()..];
                }
                None => rest = tail,
            }
        } else {
            out.push('\\');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Quote and escape a string parameter
pub(crate) fn encode_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                out.push_str("\\X2\\");
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("{:04X}", unit));
                }
                out.push_str("\\X0\\");
            }
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('sample'),'2;1');
FILE_NAME('a.stp','2024-01-01T00:00:00',('me'),(''),'','','');
FILE_SCHEMA(('CONFIG_CONTROL_DESIGN'));
ENDSEC;
DATA;
/* a comment */
#1 = CARTESIAN_POINT('origin',(0.,1.5,-2.E-1));
#2 = DIRECTION('',(0.0,0.0,1.0));
#3 = (LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.));
#4 = UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE(1.E-07),#3,'distance_accuracy_value','it''s');
#5 = PRODUCT('P1','Caf\X2\00E9\X0\','',(#6));
#6 = ORIENTED_EDGE('',*,*,#7,.T.);
#7 = VERTEX_POINT('',$);
ENDSEC;
END-ISO-10303-21;
"#;

    #[test]
    fn test_parse_sample() {
        let file = StepFile::parse(SAMPLE).unwrap();
        assert_eq!(file.entities.len(), 7);
        assert_eq!(file.schema(), Some("CONFIG_CONTROL_DESIGN"));

        let point = file.get(1).unwrap().simple().unwrap();
        assert_eq!(point.name, "CARTESIAN_POINT");
        assert_eq!(point.string(0), Some("origin"));
        assert_eq!(point.param(1).unwrap().reals(), vec![0.0, 1.5, -0.2]);
    }

    #[test]
    fn test_complex_instance() {
        let file = StepFile::parse(SAMPLE).unwrap();
        let unit = file.get(3).unwrap();
        assert!(unit.is_complex());
        assert!(unit.is("LENGTH_UNIT"));
        let si = unit.record("SI_UNIT").unwrap();
        assert_eq!(si.param(0).and_then(Value::as_enum), Some("MILLI"));
        assert_eq!(unit.record("NAMED_UNIT").unwrap().param(0), Some(&Value::Derived));
    }

    #[test]
    fn test_typed_and_escaped_values() {
        let file = StepFile::parse(SAMPLE).unwrap();
        let measure = file.get(4).unwrap().simple().unwrap();
        assert_eq!(measure.real(0), Some(1e-7));
        assert_eq!(measure.entity(1), Some(3));
        assert_eq!(measure.string(3), Some("it's"));

        let product = file.get(5).unwrap().simple().unwrap();
        assert_eq!(product.string(1), Some("Café"));
        assert_eq!(product.refs(3), vec![6]);

        let edge = file.get(6).unwrap().simple().unwrap();
        assert_eq!(edge.boolean(4), Some(true));
        assert_eq!(file.get(7).unwrap().simple().unwrap().param(1), Some(&Value::Omitted));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(StepFile::parse("not a step file"), Err(Error::Format(_))));
        assert!(StepFile::parse("ISO-10303-21;\nHEADER;\nENDSEC;\n").is_err());
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(decode_string("a\\\\b"), "a\\b");
        assert_eq!(decode_string("\\X\\E9"), "é");
        assert_eq!(encode_string("it's"), "'it''s'");
        let encoded = encode_string("Café");
        assert_eq!(encoded, "'Caf\\X2\\00E9\\X0\\'");
        assert_eq!(decode_string(&encoded[1..encoded.len() - 1]), "Café");
    }
}
