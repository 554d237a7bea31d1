// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Fixed-column IGES file structure: S, G, D, P and T sections

use crate::error::{Error, Result};
use tracing::debug;

/// Data columns of a line (1-72)
pub(crate) const DATA_COLUMNS: usize = 72;
/// Parameter data columns of a P line (1-64)
pub(crate) const PARAMETER_COLUMNS: usize = 64;

/// One free-format parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Integer(i64),
    Real(f64),
    String(String),
    /// Omitted between two delimiters; the entity default applies
    Default,
}

/// Directory entry (two D lines) plus parameter data of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct IgesEntity {
    /// Sequence number of the first D line
    pub de: usize,
    pub entity_type: i64,
    pub form: i64,
    /// DE pointer of the governing 124 matrix, 0 for identity
    pub transform: usize,
    /// Status digits: blank, subordinate switch, use flag, hierarchy
    pub status: [u8; 4],
    pub label: String,
    pub params: Vec<Param>,
}

impl IgesEntity {
    /// Physically or logically dependent on another entity
    pub fn is_subordinate(&self) -> bool {
        self.status[1] != 0
    }

    pub fn use_flag(&self) -> u8 {
        self.status[2]
    }

    fn missing(&self, index: usize) -> Error {
        Error::format(format!(
            "IGES entity {} (type {}) is missing parameter {}",
            self.de,
            self.entity_type,
            index + 1
        ))
    }

    pub fn real(&self, index: usize) -> Result<f64> {
        match self.params.get(index) {
            Some(Param::Real(v)) => Ok(*v),
            Some(Param::Integer(v)) => Ok(*v as f64),
            Some(Param::Default) => Ok(0.0),
            Some(Param::String(_)) => Err(Error::format(format!(
                "IGES entity {} parameter {} is a string, expected a number",
                self.de,
                index + 1
            ))),
            None => Err(self.missing(index)),
        }
    }

    pub fn integer(&self, index: usize) -> Result<i64> {
        match self.params.get(index) {
            Some(Param::Integer(v)) => Ok(*v),
            Some(Param::Real(v)) if v.fract() == 0.0 => Ok(*v as i64),
            Some(Param::Default) => Ok(0),
            Some(_) => Err(Error::format(format!(
                "IGES entity {} parameter {} is not an integer",
                self.de,
                index + 1
            ))),
            None => Err(self.missing(index)),
        }
    }

    /// Directory pointer; negated pointers are read by magnitude
    pub fn pointer(&self, index: usize) -> Result<usize> {
        Ok(self.integer(index)?.unsigned_abs() as usize)
    }

    /// Count parameter, rejecting negative values
    pub fn count(&self, index: usize) -> Result<usize> {
        usize::try_from(self.integer(index)?).map_err(|_| {
            Error::format(format!(
                "IGES entity {} has a negative count in parameter {}",
                self.de,
                index + 1
            ))
        })
    }

    pub fn reals(&self, start: usize, count: usize) -> Result<Vec<f64>> {
        (start..start + count).map(|i| self.real(i)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IgesFile {
    pub start: String,
    pub global: Vec<Param>,
    /// Indexed by `(de - 1) / 2`
    pub entities: Vec<IgesEntity>,
}

impl IgesFile {
    pub fn parse(text: &str) -> Result<Self> {
        let mut start = Vec::new();
        let mut global = String::new();
        let mut directory: Vec<String> = Vec::new();
        let mut parameters: Vec<(usize, String)> = Vec::new();

        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let bytes = line.as_bytes();
            if bytes.len() <= DATA_COLUMNS {
                return Err(Error::format(format!(
                    "IGES line {} is shorter than {} columns",
                    number + 1,
                    DATA_COLUMNS + 1
                )));
            }
            let data = String::from_utf8_lossy(&bytes[..DATA_COLUMNS]).into_owned();
            match bytes[DATA_COLUMNS] {
                b'S' => start.push(data.trim_end().to_string()),
                b'G' => global.push_str(&data),
                b'D' => directory.push(data),
                b'P' => {
                    let content = String::from_utf8_lossy(&bytes[..PARAMETER_COLUMNS]);
                    let pointer = String::from_utf8_lossy(&bytes[PARAMETER_COLUMNS..DATA_COLUMNS]);
                    let de = parse_field(&pointer).map_err(|e| {
                        Error::format(format!("IGES line {}: {}", number + 1, e))
                    })?;
                    parameters.push((de.unsigned_abs() as usize, content.into_owned()));
                }
                b'T' => break,
                b'C' | b'F' => {
                    return Err(Error::format("compressed IGES files are not supported"));
                }
                other => {
                    return Err(Error::format(format!(
                        "IGES line {} has unknown section letter '{}'",
                        number + 1,
                        other as char
                    )));
                }
            }
        }

        if directory.len() % 2 != 0 {
            return Err(Error::format("IGES directory section has an odd number of lines"));
        }

        let (param_delimiter, record_delimiter) = delimiters(&global);
        let global = parse_params(&global, param_delimiter, record_delimiter)?;

        let mut entities = Vec::with_capacity(directory.len() / 2);
        for (index, pair) in directory.chunks(2).enumerate() {
            entities.push(directory_entry(2 * index + 1, &pair[0], &pair[1])?);
        }

        let mut records: Vec<String> = vec![String::new(); entities.len()];
        for (de, content) in parameters {
            let slot = entity_index(de, entities.len()).ok_or_else(|| {
                Error::format(format!("IGES parameter line points to missing entity {}", de))
            })?;
            records[slot].push_str(&content);
        }

        for (entity, record) in entities.iter_mut().zip(records) {
            let mut params = parse_params(&record, param_delimiter, record_delimiter)?;
            if params.is_empty() {
                continue;
            }
            match params.remove(0) {
                Param::Integer(t) if t == entity.entity_type => {}
                other => {
                    return Err(Error::format(format!(
                        "IGES entity {} parameter data starts with {:?}, expected type {}",
                        entity.de, other, entity.entity_type
                    )));
                }
            }
            entity.params = params;
        }

        debug!(entities = entities.len(), "parsed IGES sections");
        Ok(Self {
            start: start.join("\n"),
            global,
            entities,
        })
    }

    pub fn get(&self, de: usize) -> Result<&IgesEntity> {
        entity_index(de, self.entities.len())
            .map(|i| &self.entities[i])
            .ok_or_else(|| Error::format(format!("IGES directory pointer {} is invalid", de)))
    }

    /// Global parameter `index` (1-based, as numbered by the standard) as text
    pub fn global_string(&self, index: usize) -> Option<&str> {
        match self.global.get(index.checked_sub(1)?) {
            Some(Param::String(s)) => Some(s),
            _ => None,
        }
    }
}

fn entity_index(de: usize, len: usize) -> Option<usize> {
    if de % 2 == 1 && (de - 1) / 2 < len {
        Some((de - 1) / 2)
    } else {
        None
    }
}

fn parse_field(field: &str) -> std::result::Result<i64, String> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(0);
    }
    field
        .parse()
        .map_err(|_| format!("invalid integer field '{}'", field))
}

fn fields(line: &str) -> Vec<&str> {
    (0..9)
        .map(|i| line.get(i * 8..(i + 1) * 8).unwrap_or(""))
        .collect()
}

fn directory_entry(de: usize, first: &str, second: &str) -> Result<IgesEntity> {
    let a = fields(first);
    let b = fields(second);
    let field = |value: &str| {
        parse_field(value)
            .map_err(|e| Error::format(format!("IGES directory entry {}: {}", de, e)))
    };

    let mut status = [0u8; 4];
    let digits: Vec<u8> = format!("{:0>8}", a[8].trim().replace(' ', "0"))
        .bytes()
        .collect();
    for (i, pair) in digits.chunks(2).take(4).enumerate() {
        let text = std::str::from_utf8(pair).unwrap_or("00");
        status[i] = text.parse().map_err(|_| {
            Error::format(format!("IGES directory entry {} has invalid status '{}'", de, a[8]))
        })?;
    }

    Ok(IgesEntity {
        de,
        entity_type: field(a[0])?,
        form: field(b[4])?,
        transform: field(a[6])?.unsigned_abs() as usize,
        status,
        label: b[7].trim().to_string(),
        params: Vec::new(),
    })
}

/// Parameter and record delimiters declared at the start of the G section
fn delimiters(global: &str) -> (char, char) {
    let chars: Vec<char> = global.trim_start().chars().collect();
    let mut param = ',';
    let mut record = ';';
    let mut i = 0;
    if chars.len() >= 3 && chars[0] == '1' && matches!(chars[1], 'H' | 'h') {
        param = chars[2];
        i = 3;
    }
    while chars.get(i) == Some(&' ') {
        i += 1;
    }
    if chars.get(i) == Some(&param) {
        i += 1;
    }
    while chars.get(i) == Some(&' ') {
        i += 1;
    }
    if chars.len() >= i + 3 && chars[i] == '1' && matches!(chars[i + 1], 'H' | 'h') {
        record = chars[i + 2];
    }
    (param, record)
}

/// Split one free-format record into parameters, stopping at the record delimiter
pub(crate) fn parse_params(text: &str, delimiter: char, terminator: char) -> Result<Vec<Param>> {
    let chars: Vec<char> = text.chars().collect();
    let mut params = Vec::new();
    let mut i = 0;

    loop {
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        if i >= chars.len() || chars[i] == terminator {
            break;
        }
        if chars[i] == delimiter {
            params.push(Param::Default);
            i += 1;
            continue;
        }

        let digits_end = chars[i..]
            .iter()
            .position(|c| !c.is_ascii_digit())
            .map_or(chars.len(), |p| i + p);
        if digits_end > i && digits_end < chars.len() && matches!(chars[digits_end], 'H' | 'h') {
            let len: usize = chars[i..digits_end]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| Error::format("invalid Hollerith length"))?;
            let begin = digits_end + 1;
            let end = begin + len;
            if end > chars.len() {
                return Err(Error::format("IGES Hollerith string runs past the record"));
            }
            params.push(Param::String(chars[begin..end].iter().collect()));
            i = end;
            while i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
        } else {
            let token_end = chars[i..]
                .iter()
                .position(|&c| c == delimiter || c == terminator)
                .map_or(chars.len(), |p| i + p);
            let token: String = chars[i..token_end].iter().collect();
            params.push(number(token.trim())?);
            i = token_end;
        }

        match chars.get(i) {
            Some(&c) if c == delimiter => i += 1,
            Some(&c) if c == terminator => break,
            None => break,
            Some(&c) => {
                return Err(Error::format(format!(
                    "unexpected '{}' after IGES parameter {}",
                    c,
                    params.len()
                )));
            }
        }
    }
    Ok(params)
}

fn number(token: &str) -> Result<Param> {
    if token.is_empty() {
        return Ok(Param::Default);
    }
    let normalized = token.replace(['D', 'd'], "E");
    if !normalized.contains(['.', 'E', 'e']) {
        if let Ok(v) = normalized.parse::<i64>() {
            return Ok(Param::Integer(v));
        }
    }
    normalized
        .parse::<f64>()
        .map(Param::Real)
        .map_err(|_| Error::format(format!("invalid IGES number '{}'", token)))
}

/// Hollerith form of a string
pub(crate) fn hollerith(text: &str) -> String {
    format!("{}H{}", text.chars().count(), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params("110,1.,,-2.5D1,3,5HA,B;C;9,9", ',', ';').unwrap();
        assert_eq!(
            params,
            vec![
                Param::Integer(110),
                Param::Real(1.0),
                Param::Default,
                Param::Real(-25.0),
                Param::Integer(3),
                Param::String("A,B;C".into()),
            ]
        );
    }

    #[test]
    fn test_custom_delimiters() {
        let global = "1H/ / 1H# /4Hpart# ";
        assert_eq!(delimiters(global), ('/', '#'));
        let params = parse_params(global, '/', '#').unwrap();
        assert_eq!(params[2], Param::String("part".into()));
    }

    #[test]
    fn test_hollerith() {
        assert_eq!(hollerith("MM"), "2HMM");
        assert_eq!(hollerith(""), "0H");
    }

    #[test]
    fn test_short_line_rejected() {
        assert!(matches!(IgesFile::parse("too short"), Err(Error::Format(_))));
    }

    #[test]
    fn test_parse_minimal_file() {
        let line = |data: &str, section: char, seq: usize| format!("{:<72}{}{:>7}\n", data, section, seq);
        let mut text = String::new();
        text += &line("minimal", 'S', 1);
        text += &line("1H,,1H;,4Hdemo;", 'G', 1);
        text += &line(&format!("{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}", 110, 1, 0, 0, 0, 0, 0, 0, "00000000"), 'D', 1);
        text += &line(&format!("{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}", 110, 0, 0, 1, 0, "", "", "LINE", 0), 'D', 2);
        text += &line(&format!("{:<64}{:>8}", "110,0.,0.,0.,1.,2.,3.;", 1), 'P', 1);
        text += &line("S      1G      1D      2P      1", 'T', 1);

        let file = IgesFile::parse(&text).unwrap();
        assert_eq!(file.global_string(3), Some("demo"));
        let entity = file.get(1).unwrap();
        assert_eq!(entity.entity_type, 110);
        assert_eq!(entity.label, "LINE");
        assert!(!entity.is_subordinate());
        assert_eq!(entity.reals(3, 3).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(file.get(3).is_err());
        assert!(file.get(2).is_err());
    }
}
